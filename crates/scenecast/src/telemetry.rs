//! Performance telemetry.
//!
//! The host aggregates frame timings, event counts, and memory readings in
//! a [`PerfMonitor`] and emits one [`PerfReport`] per interval, then starts
//! over. The spectator keeps only the latest report, as a [`PerfSnapshot`].
//! Aggregation is off until a spectator asks for it with `PERFDIAG`.

use std::collections::BTreeMap;
use std::time::Duration;

use scenecast_protocol::{CountEntry, DurationEntry, MemoryEntry, PerfReport};
use scenecast_tick::Interval;
use tracing::debug;

/// Host-side aggregation for one reporting interval at a time.
#[derive(Debug)]
pub struct PerfMonitor {
    enabled: bool,
    interval: Interval,
    frames: u32,
    /// Total time per category over the interval.
    durations: BTreeMap<String, Duration>,
    events: BTreeMap<String, u64>,
    memory: BTreeMap<String, u64>,
}

impl PerfMonitor {
    /// A disabled monitor reporting every `period` once enabled.
    pub fn new(period: Duration) -> Self {
        Self {
            enabled: false,
            interval: Interval::new(period),
            frames: 0,
            durations: BTreeMap::new(),
            events: BTreeMap::new(),
            memory: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns aggregation on or off. Either way the current interval's data
    /// is dropped and a fresh interval starts.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!(enabled, "telemetry aggregation toggled");
        }
        self.enabled = enabled;
        self.reset();
    }

    fn reset(&mut self) {
        self.interval.reset();
        self.frames = 0;
        self.durations.clear();
        self.events.clear();
        self.memory.clear();
    }

    /// Counts one host frame.
    pub fn record_frame(&mut self) {
        if self.enabled {
            self.frames += 1;
        }
    }

    /// Adds time spent in `category` during the current frame.
    pub fn record_duration(&mut self, category: &str, elapsed: Duration) {
        if self.enabled {
            *self.durations.entry(category.to_owned()).or_default() += elapsed;
        }
    }

    /// Adds `count` occurrences of `event`.
    pub fn record_event(&mut self, event: &str, count: u64) {
        if self.enabled {
            *self.events.entry(event.to_owned()).or_default() += count;
        }
    }

    /// Records the latest reading for a memory pool. Later readings in the
    /// same interval replace earlier ones.
    pub fn record_memory(&mut self, pool: &str, bytes: u64) {
        if self.enabled {
            self.memory.insert(pool.to_owned(), bytes);
        }
    }

    /// Advances by `dt`; returns the interval's report when one is due.
    pub fn poll(&mut self, dt: Duration) -> Option<PerfReport> {
        if !self.enabled || !self.interval.advance(dt) {
            return None;
        }
        let frames = self.frames.max(1);
        let report = PerfReport {
            frame_count: self.frames,
            durations: self
                .durations
                .iter()
                .map(|(name, total)| DurationEntry {
                    name: name.clone(),
                    millis: (total.as_secs_f64() * 1000.0 / f64::from(frames)) as f32,
                })
                .collect(),
            summed_durations: self
                .durations
                .iter()
                .map(|(name, total)| DurationEntry {
                    name: name.clone(),
                    millis: (total.as_secs_f64() * 1000.0) as f32,
                })
                .collect(),
            event_counts: self
                .events
                .iter()
                .map(|(name, count)| CountEntry {
                    name: name.clone(),
                    count: *count,
                })
                .collect(),
            memory_usage: self
                .memory
                .iter()
                .map(|(name, bytes)| MemoryEntry {
                    name: name.clone(),
                    bytes: *bytes,
                })
                .collect(),
        };
        self.frames = 0;
        self.durations.clear();
        self.events.clear();
        self.memory.clear();
        Some(report)
    }
}

/// The latest telemetry record a spectator received.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfSnapshot {
    report: PerfReport,
}

impl PerfSnapshot {
    pub fn new(report: PerfReport) -> Self {
        Self { report }
    }

    pub fn report(&self) -> &PerfReport {
        &self.report
    }

    pub fn frame_count(&self) -> u32 {
        self.report.frame_count
    }

    /// Average per-frame milliseconds for `category`.
    pub fn average_millis(&self, category: &str) -> Option<f32> {
        find(&self.report.durations, category, |e| &e.name).map(|e| e.millis)
    }

    /// Total milliseconds for `category` over the interval.
    pub fn summed_millis(&self, category: &str) -> Option<f32> {
        find(&self.report.summed_durations, category, |e| &e.name).map(|e| e.millis)
    }

    pub fn event_count(&self, event: &str) -> Option<u64> {
        find(&self.report.event_counts, event, |e| &e.name).map(|e| e.count)
    }

    pub fn memory_bytes(&self, pool: &str) -> Option<u64> {
        find(&self.report.memory_usage, pool, |e| &e.name).map(|e| e.bytes)
    }
}

fn find<'a, T>(entries: &'a [T], name: &str, key: impl Fn(&T) -> &String) -> Option<&'a T> {
    entries.iter().find(|e| key(*e) == name)
}
