//! Integration tests for the frame pacer.
//!
//! Uses paused tokio time so `sleep_until` resolves as soon as the runtime
//! is idle and elapsed times are exact.

use std::time::Duration;

use scenecast_tick::{TickConfig, TickScheduler};

fn config_20hz() -> TickConfig {
    TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_rate(20)
    }
}

#[test]
fn test_default_config_is_60hz() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.rate_hz, 60);
    assert_eq!(cfg.tick_duration(), Duration::from_secs_f64(1.0 / 60.0));
}

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(config_20hz());
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.rate_hz(), 20);
    assert_eq!(s.tick_duration(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_and_increments() {
    let mut s = TickScheduler::new(config_20hz());

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert_eq!(info.dt, Duration::from_millis(50));
    assert_eq!(info.elapsed, Duration::from_millis(50));
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(s.tick_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_keep_cadence() {
    let mut s = TickScheduler::new(config_20hz());
    let start = tokio::time::Instant::now();

    for expected in 1..=5 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert_eq!(info.elapsed, Duration::from_millis(50));
    }
    assert_eq!(start.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_overrun_skips_and_reports_real_elapsed() {
    let mut s = TickScheduler::new(config_20hz());
    s.wait_for_tick().await;

    // Simulate a frame that took 130ms of work.
    tokio::time::advance(Duration::from_millis(130)).await;
    s.record_tick_end();

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 2);
    assert_eq!(info.late_by, Duration::from_millis(80));
    assert_eq!(info.ticks_skipped, 1);
    assert_eq!(info.elapsed, Duration::from_millis(130));

    // Next tick is scheduled from now, not from the missed deadline.
    let info = s.wait_for_tick().await;
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(info.elapsed, Duration::from_millis(50));
    assert_eq!(s.metrics().late_ticks, 1);
    assert_eq!(s.metrics().total_skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_tracks_frame_time() {
    let mut s = TickScheduler::new(config_20hz());
    s.wait_for_tick().await;
    tokio::time::advance(Duration::from_millis(10)).await;

    let work = s.record_tick_end().unwrap();
    assert_eq!(work, Duration::from_millis(10));
    assert_eq!(s.metrics().last_frame_time, work);
    assert_eq!(s.metrics().max_frame_time, work);
    assert!((s.metrics().budget_utilization - 0.2).abs() < 1e-9);

    // Without a tick in progress there is nothing to record.
    assert!(s.record_tick_end().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_initial_jitter_delays_only_first_tick() {
    let mut s = TickScheduler::new(TickConfig {
        initial_jitter_us: 5_000,
        ..TickConfig::with_rate(20)
    });

    let first = s.wait_for_tick().await;
    assert!(first.elapsed >= Duration::from_millis(50));
    assert!(first.elapsed < Duration::from_millis(55));

    let second = s.wait_for_tick().await;
    assert_eq!(second.elapsed, Duration::from_millis(50));
}
