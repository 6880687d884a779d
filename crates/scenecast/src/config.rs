//! Endpoint configuration.

use std::time::Duration;

use scenecast_protocol::{DEFAULT_PORT, HEARTBEAT_INTERVAL, MAX_CHUNK_SIZE, Platform, TELEMETRY_INTERVAL};
use scenecast_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// HostConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Host`](crate::Host).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Port the demo listener binds. Endpoints themselves never bind.
    pub port: u16,

    /// Largest bundle chunk sent per recipient per tick.
    pub max_chunk_size: usize,

    /// Heartbeat period while at least one spectator is connected.
    pub heartbeat_interval: Duration,

    /// Period of the aggregated telemetry record.
    pub telemetry_interval: Duration,

    /// Nominal spacing of host frames; spectators use the same value as
    /// their synchronizer's nominal interval.
    pub send_interval: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_chunk_size: MAX_CHUNK_SIZE,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            telemetry_interval: TELEMETRY_INTERVAL,
            send_interval: Duration::from_secs_f64(1.0 / 60.0),
        }
    }
}

impl HostConfig {
    /// Clamp out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        let clamped = self.max_chunk_size.clamp(1, MAX_CHUNK_SIZE);
        if clamped != self.max_chunk_size {
            warn!(
                max_chunk_size = self.max_chunk_size,
                clamped, "max_chunk_size out of range, clamping"
            );
            self.max_chunk_size = clamped;
        }
        if self.heartbeat_interval.is_zero() {
            warn!("heartbeat_interval is zero, using default");
            self.heartbeat_interval = HEARTBEAT_INTERVAL;
        }
        if self.telemetry_interval.is_zero() {
            warn!("telemetry_interval is zero, using default");
            self.telemetry_interval = TELEMETRY_INTERVAL;
        }
        if self.send_interval.is_zero() {
            warn!("send_interval is zero, using 1/60 s");
            self.send_interval = Duration::from_secs_f64(1.0 / 60.0);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// SpectatorConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Spectator`](crate::Spectator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectatorConfig {
    /// Platform this spectator asks bundles for.
    pub platform: Platform,

    /// Heartbeat period while connected.
    pub heartbeat_interval: Duration,

    /// Frame synchronizer settings, shared by the scene and camera streams.
    pub sync: SyncConfig,
}

impl Default for SpectatorConfig {
    fn default() -> Self {
        Self {
            platform: Platform::StandaloneWindows,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            sync: SyncConfig::default(),
        }
    }
}

impl SpectatorConfig {
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.heartbeat_interval.is_zero() {
            warn!("heartbeat_interval is zero, using default");
            self.heartbeat_interval = HEARTBEAT_INTERVAL;
        }
        self.sync = self.sync.validated();
        self
    }
}
