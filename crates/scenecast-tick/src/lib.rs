//! Frame pacing for Scenecast endpoints.
//!
//! Host and spectator each run one update tick per rendered frame. When no
//! renderer drives them (the demo, headless tools), [`TickScheduler`] stands
//! in for the frame loop: it fires at a fixed rate and reports the real
//! time that passed since the previous tick, which is what the frame
//! synchronizer's playback clock advances by.
//!
//! [`Interval`] gates work that runs on a slower fixed period inside the
//! tick (heartbeat, telemetry).
//!
//! # Integration
//!
//! ```ignore
//! let mut scheduler = TickScheduler::new(TickConfig::default());
//! loop {
//!     let info = scheduler.wait_for_tick().await;
//!     let frames = spectator.tick(info.elapsed);
//!     scheduler.record_tick_end();
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz. Clamped to `1..=MAX_RATE_HZ`.
    pub rate_hz: u32,
    /// Fraction of the tick budget (0.0–1.0) above which a frame that ran
    /// long is logged.
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max µs) added to the first tick so endpoints started
    /// together do not tick in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60,
            budget_warn_threshold: 0.9,
            initial_jitter_us: 1_000,
        }
    }
}

impl TickConfig {
    pub const MAX_RATE_HZ: u32 = 240;

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.rate_hz == 0 || self.rate_hz > Self::MAX_RATE_HZ {
            let clamped = self.rate_hz.clamp(1, Self::MAX_RATE_HZ);
            warn!(
                rate = self.rate_hz,
                clamped, "tick rate out of range, clamping"
            );
            self.rate_hz = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Nominal duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about one tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// Nominal tick duration (`1 / rate`).
    pub dt: Duration,
    /// Real time since the previous tick fired (or since the scheduler was
    /// created, for the first tick).
    pub elapsed: Duration,
    /// How late this tick fired relative to its deadline.
    pub late_by: Duration,
    /// Whole ticks skipped because the previous frame overran.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Frame-time metrics, updated by [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    /// Ticks that fired more than 10% past their deadline.
    pub late_ticks: u64,
    pub total_skipped: u64,
    /// Exponential moving average of frame work time (α = 0.1).
    pub avg_frame_time: Duration,
    pub max_frame_time: Duration,
    /// Work time of the most recent frame.
    pub last_frame_time: Duration,
    /// Last frame's work time over the tick budget. >1.0 means overrun.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-rate frame pacer.
///
/// Missed deadlines are skipped, never caught up: after a long frame the
/// next tick is scheduled from now, and the overrun shows up in
/// [`TickInfo::elapsed`] instead of as a burst of ticks.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Duration,
    tick_count: u64,
    next_tick: Instant,
    last_fired: Instant,
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
        } else {
            Duration::ZERO
        };
        let now = Instant::now();

        debug!(
            rate_hz = config.rate_hz,
            budget_ms = tick_duration.as_secs_f64() * 1000.0,
            "tick scheduler created"
        );

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick: now + tick_duration + jitter,
            last_fired: now,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(rate_hz))
    }

    /// Waits until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let deadline = self.next_tick;
        time::sleep_until(deadline).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(deadline);
        let late = late_by > self.tick_duration / 10;
        let ticks_skipped = if late {
            (late_by.as_nanos() / self.tick_duration.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = if late {
            now + self.tick_duration
        } else {
            deadline + self.tick_duration
        };

        let elapsed = now.saturating_duration_since(self.last_fired);
        self.last_fired = now;

        self.metrics.total_ticks += 1;
        self.metrics.total_skipped += ticks_skipped;
        if late {
            self.metrics.late_ticks += 1;
        }

        trace!(tick = self.tick_count, ?elapsed, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: self.tick_duration,
            elapsed,
            late_by,
            ticks_skipped,
        }
    }

    /// Records that the work for the current tick has finished.
    ///
    /// Returns the frame's work time, or `None` if no tick is in progress.
    pub fn record_tick_end(&mut self) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let work = Instant::now().saturating_duration_since(start);

        let utilization = work.as_secs_f64() / self.tick_duration.as_secs_f64();
        self.metrics.budget_utilization = utilization;
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                work_ms = work.as_secs_f64() * 1000.0,
                budget_ms = self.tick_duration.as_secs_f64() * 1000.0,
                "frame work approaching tick budget"
            );
        }

        self.metrics.last_frame_time = work;
        self.metrics.max_frame_time = self.metrics.max_frame_time.max(work);
        let alpha = 0.1;
        let prev = self.metrics.avg_frame_time.as_secs_f64();
        self.metrics.avg_frame_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + work.as_secs_f64() * alpha);

        Some(work)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn rate_hz(&self) -> u32 {
        self.config.rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// A fixed-period gate advanced by tick time.
///
/// `advance` returns `true` at most once per call, however much time the
/// call covers; the remainder carries over so the long-run rate holds
/// without bursts after a stall.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    accumulated: Duration,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            accumulated: Duration::ZERO,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Adds `dt` and reports whether the period has elapsed.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if self.period.is_zero() {
            return true;
        }
        self.accumulated += dt;
        if self.accumulated < self.period {
            return false;
        }
        let rem = self.accumulated.as_nanos() % self.period.as_nanos();
        self.accumulated = Duration::from_nanos(rem as u64);
        true
    }

    /// Starts a fresh period.
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
    }
}
