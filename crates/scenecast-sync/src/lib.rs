//! Frame synchronizer.
//!
//! Frame samples (scene deltas, camera poses) leave the host at a steady
//! cadence but arrive bursty, late, and occasionally out of order. The
//! [`FrameSynchronizer`] buffers them by host timestamp and, once per tick,
//! hands back the samples that are due according to a virtual playback
//! clock. Playback is monotonic: a sample is never applied if something at
//! or after its timestamp already was.
//!
//! The playback clock lives on the host's timeline. It is anchored to the
//! first sample of a session and then advanced by local elapsed time, so no
//! clock agreement between machines is assumed. If the buffer runs ahead of
//! the clock by more than the configured backlog, the clock jumps forward to
//! one nominal interval before the newest sample.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Expected spacing between host samples.
    pub nominal_interval: Duration,
    /// How far behind the first sample of a session playback starts.
    /// Larger values absorb more jitter at the cost of latency.
    pub playback_delay: Duration,
    /// Backlog (newest buffered timestamp minus playback clock), in nominal
    /// intervals, beyond which the clock fast-forwards.
    pub max_backlog_intervals: u32,
    /// Hard cap on buffered samples; exceeding it also fast-forwards.
    pub max_buffered: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            nominal_interval: Duration::from_secs_f64(1.0 / 60.0),
            playback_delay: Duration::ZERO,
            max_backlog_intervals: 10,
            max_buffered: 256,
        }
    }
}

impl SyncConfig {
    /// Clamp out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.nominal_interval.is_zero() {
            warn!("nominal_interval is zero, using 1/60 s");
            self.nominal_interval = Duration::from_secs_f64(1.0 / 60.0);
        }
        if self.max_backlog_intervals == 0 {
            warn!("max_backlog_intervals is zero, using 1");
            self.max_backlog_intervals = 1;
        }
        if self.max_buffered == 0 {
            warn!("max_buffered is zero, using 1");
            self.max_buffered = 1;
        }
        self
    }

    fn max_backlog(&self) -> f64 {
        self.nominal_interval.as_secs_f64() * f64::from(self.max_backlog_intervals)
    }
}

// ---------------------------------------------------------------------------
// Samples and stats
// ---------------------------------------------------------------------------

/// One timestamped snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample<T> {
    /// Host-relative capture time, in seconds.
    pub timestamp: f32,
    pub payload: T,
}

impl<T> FrameSample<T> {
    pub fn new(timestamp: f32, payload: T) -> Self {
        Self { timestamp, payload }
    }
}

/// Counters describing synchronizer behavior. Survive [`FrameSynchronizer::reset`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    pub applied: u64,
    /// Samples dropped because they were at or before the watermark, or
    /// duplicated a buffered timestamp.
    pub discarded: u64,
    pub fast_forwards: u64,
    /// Samples currently buffered.
    pub backlog: usize,
    /// EMA of the spacing between consecutive arriving timestamps.
    pub cadence: Option<Duration>,
    /// Current playback clock, if a session is running.
    pub playback_time: Option<f64>,
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FrameSynchronizer<T> {
    config: SyncConfig,
    /// Pending samples, ascending by timestamp, no two equal.
    buffer: VecDeque<FrameSample<T>>,
    clock: Option<f64>,
    last_applied: Option<f32>,
    last_arrival: Option<f32>,
    cadence: Option<f64>,
    applied: u64,
    discarded: u64,
    fast_forwards: u64,
}

impl<T> FrameSynchronizer<T> {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config: config.validated(),
            buffer: VecDeque::new(),
            clock: None,
            last_applied: None,
            last_arrival: None,
            cadence: None,
            applied: 0,
            discarded: 0,
            fast_forwards: 0,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Buffers a sample. Returns `false` if it was discarded as stale or as a
    /// duplicate of a buffered timestamp.
    pub fn push(&mut self, sample: FrameSample<T>) -> bool {
        let ts = sample.timestamp;
        if !ts.is_finite() {
            warn!(timestamp = ts, "non-finite frame timestamp, dropping");
            self.discarded += 1;
            return false;
        }
        if self.last_applied.is_some_and(|applied| ts <= applied) {
            trace!(timestamp = ts, "stale frame sample discarded");
            self.discarded += 1;
            return false;
        }

        self.observe_arrival(ts);

        let idx = self.buffer.partition_point(|s| s.timestamp < ts);
        if self.buffer.get(idx).is_some_and(|s| s.timestamp == ts) {
            trace!(timestamp = ts, "duplicate frame sample discarded");
            self.discarded += 1;
            return false;
        }
        self.buffer.insert(idx, sample);
        true
    }

    fn observe_arrival(&mut self, ts: f32) {
        if let Some(prev) = self.last_arrival {
            let delta = f64::from(ts - prev);
            if delta > 0.0 {
                let alpha = 0.1;
                self.cadence = Some(match self.cadence {
                    Some(c) => c * (1.0 - alpha) + delta * alpha,
                    None => delta,
                });
            }
        }
        self.last_arrival = Some(ts);
    }

    /// Advances the playback clock by `dt` and returns every sample now due,
    /// in timestamp order.
    pub fn tick(&mut self, dt: Duration) -> Vec<FrameSample<T>> {
        let clock = match self.clock {
            Some(clock) => clock + dt.as_secs_f64(),
            None => {
                // First tick with data anchors the session.
                let Some(first) = self.buffer.front() else {
                    return Vec::new();
                };
                let anchor =
                    f64::from(first.timestamp) - self.config.playback_delay.as_secs_f64();
                debug!(anchor, "playback clock anchored");
                anchor
            }
        };
        self.clock = Some(clock);

        let mut due = Vec::new();
        self.drain_due(&mut due);

        if let Some(newest) = self.buffer.back().map(|s| f64::from(s.timestamp)) {
            let backlog = newest - clock;
            if backlog > self.config.max_backlog() || self.buffer.len() > self.config.max_buffered
            {
                let target = (newest - self.config.nominal_interval.as_secs_f64()).max(clock);
                debug!(
                    from = clock,
                    to = target,
                    buffered = self.buffer.len(),
                    "playback behind, fast-forwarding"
                );
                self.clock = Some(target);
                self.fast_forwards += 1;
                self.drain_due(&mut due);
            }
        }

        // Densely spaced samples can still exceed the cap one interval
        // behind the newest; play the oldest out until it holds.
        let overflow = self.buffer.len().saturating_sub(self.config.max_buffered);
        if overflow > 0 {
            if let Some(last_over) = self.buffer.get(overflow - 1) {
                let target = f64::from(last_over.timestamp);
                debug!(overflow, to = target, "frame buffer over cap, advancing");
                self.clock = self.clock.map(|c| c.max(target));
                self.drain_due(&mut due);
            }
        }

        due
    }

    fn drain_due(&mut self, out: &mut Vec<FrameSample<T>>) {
        let Some(clock) = self.clock else {
            return;
        };
        while self
            .buffer
            .front()
            .is_some_and(|s| f64::from(s.timestamp) <= clock)
        {
            let Some(sample) = self.buffer.pop_front() else {
                break;
            };
            // The buffer never holds stale samples, but the watermark is
            // the invariant, so check it here too.
            if self.last_applied.is_some_and(|a| sample.timestamp <= a) {
                self.discarded += 1;
                continue;
            }
            trace!(timestamp = sample.timestamp, "frame sample applied");
            self.last_applied = Some(sample.timestamp);
            self.applied += 1;
            out.push(sample);
        }
    }

    /// Drops all buffered samples and unsets the clock and watermark.
    ///
    /// Call on every (re)connect; a new session never applies data from the
    /// previous one.
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            debug!(dropped = self.buffer.len(), "frame buffer cleared");
        }
        self.buffer.clear();
        self.clock = None;
        self.last_applied = None;
        self.last_arrival = None;
        self.cadence = None;
    }

    /// Timestamp of the most recently applied sample.
    pub fn last_applied(&self) -> Option<f32> {
        self.last_applied
    }

    pub fn playback_time(&self) -> Option<f64> {
        self.clock
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            applied: self.applied,
            discarded: self.discarded,
            fast_forwards: self.fast_forwards,
            backlog: self.buffer.len(),
            cadence: self.cadence.map(Duration::from_secs_f64),
            playback_time: self.clock,
        }
    }
}

impl<T> Default for FrameSynchronizer<T> {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
