//! Wire protocol for Scenecast.
//!
//! This crate defines what host and spectator say to each other:
//!
//! - **Framing** ([`command`], [`CommandFrame`]): every message is a
//!   length-prefixed identifier followed by a command-specific payload.
//! - **Fields** ([`wire`]): the little-endian binary layout payloads use.
//! - **Payloads** ([`CommandPayload`] and its implementors): one typed
//!   struct per command.
//! - **Routing** ([`CommandRouter`]): identifier → handler dispatch.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw messages) and the
//! endpoints. It doesn't know about connections; it only turns bytes into
//! commands and hands them to whoever registered for them.
//!
//! ```text
//! Transport (bytes) → Protocol (CommandFrame → handler) → Host / Spectator
//! ```

use std::time::Duration;

mod codec;
pub mod command;
mod error;
mod router;
mod types;
pub mod wire;

pub use codec::{Codec, JsonCodec};
pub use command::CommandFrame;
pub use error::ProtocolError;
pub use router::{CommandRouter, Dispatch, Handler, HandlerId};
pub use types::{
    BundleInfo, BundleInfoReport, CameraPose, CommandPayload, CountEntry, DownloadStart,
    DurationEntry, MemoryEntry, PerfDiagnostics, PerfReport, Platform, RequestBundleDownload,
    RequestBundleInfo, SceneDelta, asset_load_completed_message, download_chunk_message,
};

/// Port the host listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 7410;

/// Largest bundle chunk a host sends in one message (256 KiB).
pub const MAX_CHUNK_SIZE: usize = 262_144;

/// How often each endpoint sends a heartbeat while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// How often the host sends an aggregated telemetry record.
pub const TELEMETRY_INTERVAL: Duration = Duration::from_secs(1);
