//! Command identifiers and message framing.
//!
//! A message on the wire is `{identifier}{payload}`: the identifier is a
//! length-prefixed string (see [`crate::wire`]) and the payload is every
//! byte after it. One message is one transport send; the transport keeps
//! the boundaries, so the payload needs no length of its own.

use bytes::{BufMut, Bytes, BytesMut};

use crate::ProtocolError;
use crate::wire::{WireReader, WireWrite};

/// Host → spectator: timestamp, then an opaque scene delta.
pub const SYNC: &str = "SYNC";
/// Host → spectator: timestamp, position, rotation.
pub const CAMERA: &str = "Camera";
/// Host → spectator: aggregated telemetry record.
pub const PERF: &str = "Perf";
/// Spectator → host: enable or disable telemetry aggregation.
pub const PERF_DIAGNOSTICS: &str = "PERFDIAG";
/// Spectator → host: which bundle do you have for my platform?
pub const REQUEST_ASSET_BUNDLE_INFO: &str = "RequestAssetBundleInfo";
/// Host → spectator: bundle identity, or "no asset".
pub const REPORT_ASSET_BUNDLE_INFO: &str = "ReportAssetBundleInfo";
/// Spectator → host: please stream the bundle for my platform.
pub const REQUEST_ASSET_BUNDLE_DOWNLOAD: &str = "RequestAssetBundleDownload";
/// Host → spectator: transfer is starting; identity and total size.
pub const REPORT_ASSET_BUNDLE_DOWNLOAD_START: &str = "ReportAssetBundleDownloadStart";
/// Host → spectator: one chunk of bundle bytes.
pub const REPORT_ASSET_BUNDLE_DOWNLOAD_DATA: &str = "ReportAssetBundleDownloadData";
/// Spectator → host: the downloaded bundle loaded successfully.
pub const ASSET_LOAD_COMPLETED: &str = "AssetLoadCompleted";

/// Every command the protocol defines.
pub const ALL: &[&str] = &[
    SYNC,
    CAMERA,
    PERF,
    PERF_DIAGNOSTICS,
    REQUEST_ASSET_BUNDLE_INFO,
    REPORT_ASSET_BUNDLE_INFO,
    REQUEST_ASSET_BUNDLE_DOWNLOAD,
    REPORT_ASSET_BUNDLE_DOWNLOAD_START,
    REPORT_ASSET_BUNDLE_DOWNLOAD_DATA,
    ASSET_LOAD_COMPLETED,
];

/// Liveness traffic. Deliberately outside [`ALL`]: nothing handles it.
pub const HEARTBEAT: &str = "HEARTBEAT";

/// Longest identifier the framing accepts, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// A decoded message, borrowing from the received bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame<'a> {
    pub command: &'a str,
    pub payload: &'a [u8],
}

impl<'a> CommandFrame<'a> {
    /// Splits a raw message into identifier and payload.
    ///
    /// # Errors
    /// Fails if the identifier is truncated, not UTF-8, empty, or longer
    /// than [`MAX_IDENTIFIER_LEN`].
    pub fn parse(message: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(message);
        let command = reader.read_str()?;
        if command.is_empty() || command.len() > MAX_IDENTIFIER_LEN {
            return Err(ProtocolError::InvalidIdentifier(command.len()));
        }
        Ok(Self {
            command,
            payload: reader.rest(),
        })
    }
}

/// Starts a message buffer with the identifier already written.
pub fn begin(command: &str, payload_hint: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(1 + command.len() + payload_hint);
    buf.put_wire_str(command);
    buf
}

/// Frames a command with a raw payload.
pub fn encode(command: &str, payload: &[u8]) -> Bytes {
    let mut buf = begin(command, payload.len());
    buf.put_slice(payload);
    buf.freeze()
}
