//! # Scenecast
//!
//! Live scene mirroring from one host device to any number of spectators.
//!
//! The host ticks once per rendered frame and broadcasts its camera pose and
//! scene deltas. Each spectator ticks on its own schedule, buffers what
//! arrives, and plays it back smoothly through a frame synchronizer. Shared
//! assets the spectator is missing are negotiated and streamed alongside,
//! one bounded chunk per host tick.
//!
//! Both endpoints are transport-agnostic: they own the consumer half of an
//! event queue and talk to peers only through
//! [`Connection`](scenecast_transport::Connection) handles the transport
//! hands them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scenecast::prelude::*;
//!
//! # fn main() -> Result<(), ScenecastError> {
//! let mut host: Host<LoopbackConnection> = Host::new(HostConfig::default(), BundleCatalog::new())?;
//! let mut spectator: Spectator<LoopbackConnection, RegistryCache> = Spectator::new(
//!     SpectatorConfig::for_platform(Platform::Android),
//!     RegistryCache::new(CodecRegistry::with_builtin()),
//! )?;
//! loopback_pair(&host.events_sender(), &spectator.events_sender())?;
//!
//! let dt = std::time::Duration::from_millis(16);
//! host.tick(dt, &HostFrame::new(0.0).with_camera([0.0; 3], [0.0, 0.0, 0.0, 1.0]));
//! let frame = spectator.tick(dt);
//! # let _ = frame;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod heartbeat;
mod host;
mod spectator;
mod telemetry;

pub use config::{HostConfig, SpectatorConfig};
pub use error::ScenecastError;
pub use heartbeat::Heartbeat;
pub use host::{Host, HostContext, HostFrame};
pub use spectator::{Spectator, SpectatorContext, SpectatorFrame};
pub use telemetry::{PerfMonitor, PerfSnapshot};

use scenecast_protocol::CommandPayload;

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::{
        Host, HostConfig, HostFrame, PerfSnapshot, ScenecastError, Spectator, SpectatorConfig,
        SpectatorFrame,
    };
    pub use scenecast_assets::{
        AssetCache, AssetState, AssetStatus, Bundle, BundleCatalog, BundleWriter, CodecRegistry,
        RegistryCache,
    };
    pub use scenecast_protocol::{CameraPose, Platform};
    pub use scenecast_sync::{FrameSample, SyncConfig};
    pub use scenecast_tick::{TickConfig, TickScheduler};
    pub use scenecast_transport::{LoopbackConnection, loopback_pair};
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Call once at startup; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Decodes a payload, logging and returning `None` if it is malformed.
pub(crate) fn decode_or_warn<P: CommandPayload>(payload: &[u8]) -> Option<P> {
    match P::read(payload) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(command = P::COMMAND, error = %e, "undecodable payload, dropping");
            None
        }
    }
}
