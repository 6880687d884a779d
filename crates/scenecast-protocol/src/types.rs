//! Typed payloads for every command in the protocol.
//!
//! Each type knows its identifier and its binary layout through
//! [`CommandPayload`]. Decoding ignores trailing bytes after the last
//! known field, so a newer peer can append fields without breaking an
//! older one.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::wire::{WireReader, WireWrite};
use crate::{Codec, JsonCodec, ProtocolError, command};

/// A payload type bound to one command identifier.
pub trait CommandPayload: Sized {
    /// The identifier this payload travels under.
    const COMMAND: &'static str;

    /// Appends the payload fields (not the identifier) to `buf`.
    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError>;

    /// Parses the payload fields from the bytes after the identifier.
    fn read(payload: &[u8]) -> Result<Self, ProtocolError>;

    /// Builds the complete wire message: identifier, then payload.
    fn to_message(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = command::begin(Self::COMMAND, 32);
        self.write(&mut buf)?;
        Ok(buf.freeze())
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Target platform a bundle was built for. Travels as one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Platform {
    StandaloneWindows = 0,
    Android = 1,
    Ios = 2,
    WindowsUniversal = 3,
}

impl TryFrom<u8> for Platform {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::StandaloneWindows),
            1 => Ok(Self::Android),
            2 => Ok(Self::Ios),
            3 => Ok(Self::WindowsUniversal),
            other => Err(ProtocolError::UnknownPlatform(other)),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Frame data (host → spectator)
// ---------------------------------------------------------------------------

/// Host camera pose at a host-relative capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Seconds on the host's clock.
    pub timestamp: f32,
    pub position: [f32; 3],
    /// Quaternion `x, y, z, w`.
    pub rotation: [f32; 4],
}

impl CommandPayload for CameraPose {
    const COMMAND: &'static str = command::CAMERA;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_f32_le(self.timestamp);
        for v in self.position.iter().chain(&self.rotation) {
            buf.put_f32_le(*v);
        }
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(payload);
        let timestamp = r.read_f32()?;
        let mut position = [0.0; 3];
        for v in &mut position {
            *v = r.read_f32()?;
        }
        let mut rotation = [0.0; 4];
        for v in &mut rotation {
            *v = r.read_f32()?;
        }
        Ok(Self {
            timestamp,
            position,
            rotation,
        })
    }
}

/// Serialized per-object changes captured at one host time.
///
/// The bytes are produced by the scene broadcasters and are opaque here.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDelta {
    pub timestamp: f32,
    pub data: Bytes,
}

impl CommandPayload for SceneDelta {
    const COMMAND: &'static str = command::SYNC;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.reserve(4 + self.data.len());
        buf.put_f32_le(self.timestamp);
        buf.put_slice(&self.data);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(payload);
        let timestamp = r.read_f32()?;
        Ok(Self {
            timestamp,
            data: Bytes::copy_from_slice(r.rest()),
        })
    }
}

// ---------------------------------------------------------------------------
// Asset bundle negotiation
// ---------------------------------------------------------------------------

/// Identity and display name of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleInfo {
    /// Opaque content fingerprint; equal identities mean the same bundle.
    pub identity: String,
    pub display_name: String,
}

/// Spectator → host: ask what the host has for `platform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBundleInfo {
    pub platform: Platform,
}

impl CommandPayload for RequestBundleInfo {
    const COMMAND: &'static str = command::REQUEST_ASSET_BUNDLE_INFO;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u8(self.platform as u8);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let platform = Platform::try_from(WireReader::new(payload).read_u8()?)?;
        Ok(Self { platform })
    }
}

/// Spectator → host: start streaming the bundle for `platform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBundleDownload {
    pub platform: Platform,
}

impl CommandPayload for RequestBundleDownload {
    const COMMAND: &'static str = command::REQUEST_ASSET_BUNDLE_DOWNLOAD;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u8(self.platform as u8);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let platform = Platform::try_from(WireReader::new(payload).read_u8()?)?;
        Ok(Self { platform })
    }
}

/// Host → spectator: the bundle the host has, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfoReport {
    pub bundle: Option<BundleInfo>,
}

impl CommandPayload for BundleInfoReport {
    const COMMAND: &'static str = command::REPORT_ASSET_BUNDLE_INFO;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_wire_bool(self.bundle.is_some());
        if let Some(info) = &self.bundle {
            buf.put_wire_str(&info.identity);
            buf.put_wire_str(&info.display_name);
        }
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(payload);
        let bundle = if r.read_bool()? {
            Some(BundleInfo {
                identity: r.read_str()?.to_owned(),
                display_name: r.read_str()?.to_owned(),
            })
        } else {
            None
        };
        Ok(Self { bundle })
    }
}

/// Host → spectator: a transfer is starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadStart {
    /// `None` when the host has nothing for the requested platform.
    pub bundle: Option<(BundleInfo, u32)>,
}

impl CommandPayload for DownloadStart {
    const COMMAND: &'static str = command::REPORT_ASSET_BUNDLE_DOWNLOAD_START;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_wire_bool(self.bundle.is_some());
        if let Some((info, total)) = &self.bundle {
            buf.put_wire_str(&info.identity);
            buf.put_wire_str(&info.display_name);
            buf.put_u32_le(*total);
        }
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(payload);
        let bundle = if r.read_bool()? {
            let info = BundleInfo {
                identity: r.read_str()?.to_owned(),
                display_name: r.read_str()?.to_owned(),
            };
            Some((info, r.read_u32()?))
        } else {
            None
        };
        Ok(Self { bundle })
    }
}

/// Host → spectator: a slice of bundle bytes. The payload is the chunk.
pub fn download_chunk_message(chunk: &[u8]) -> Bytes {
    command::encode(command::REPORT_ASSET_BUNDLE_DOWNLOAD_DATA, chunk)
}

/// Spectator → host: the bundle finished loading.
pub fn asset_load_completed_message() -> Bytes {
    command::encode(command::ASSET_LOAD_COMPLETED, &[])
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Spectator → host: turn telemetry aggregation on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfDiagnostics {
    pub enabled: bool,
}

impl CommandPayload for PerfDiagnostics {
    const COMMAND: &'static str = command::PERF_DIAGNOSTICS;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_wire_bool(self.enabled);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            enabled: WireReader::new(payload).read_bool()?,
        })
    }
}

/// A named duration in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationEntry {
    pub name: String,
    pub millis: f32,
}

/// A named event count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEntry {
    pub name: String,
    pub count: u64,
}

/// A named memory reading in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub name: String,
    pub bytes: u64,
}

/// One reporting interval of host performance data.
///
/// Encoded as JSON inside the `Perf` command; the record changes shape
/// more often than the fixed-layout commands do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfReport {
    /// Frames the host ticked during the interval.
    pub frame_count: u32,
    /// Average per-frame duration for each category.
    pub durations: Vec<DurationEntry>,
    /// Total time spent in each category over the interval.
    pub summed_durations: Vec<DurationEntry>,
    pub event_counts: Vec<CountEntry>,
    pub memory_usage: Vec<MemoryEntry>,
}

impl CommandPayload for PerfReport {
    const COMMAND: &'static str = command::PERF;

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_slice(&JsonCodec.encode(self)?);
        Ok(())
    }

    fn read(payload: &[u8]) -> Result<Self, ProtocolError> {
        JsonCodec.decode(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandFrame;

    /// Encodes through the full message path and decodes the payload back.
    fn through_wire<T: CommandPayload>(value: &T) -> T {
        let msg = value.to_message().unwrap();
        let frame = CommandFrame::parse(&msg).unwrap();
        assert_eq!(frame.command, T::COMMAND);
        T::read(frame.payload).unwrap()
    }

    #[test]
    fn test_camera_pose_layout_is_eight_floats() {
        let pose = CameraPose {
            timestamp: 2.5,
            position: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
        };
        let msg = pose.to_message().unwrap();
        let frame = CommandFrame::parse(&msg).unwrap();
        assert_eq!(frame.payload.len(), 8 * 4);
        assert_eq!(through_wire(&pose), pose);
    }

    #[test]
    fn test_camera_pose_short_payload_fails() {
        let err = CameraPose::read(&[0; 12]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn test_scene_delta_keeps_remaining_bytes_opaque() {
        let delta = SceneDelta {
            timestamp: 1.25,
            data: Bytes::from_static(&[9, 8, 7, 6]),
        };
        assert_eq!(through_wire(&delta), delta);
    }

    #[test]
    fn test_platform_unknown_byte_is_rejected() {
        let err = RequestBundleInfo::read(&[42]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPlatform(42)));
    }

    #[test]
    fn test_request_payload_is_one_platform_byte() {
        let msg = RequestBundleDownload {
            platform: Platform::Android,
        }
        .to_message()
        .unwrap();
        let frame = CommandFrame::parse(&msg).unwrap();
        assert_eq!(frame.payload, &[1]);
    }

    #[test]
    fn test_info_report_without_asset_is_single_false_byte() {
        let report = BundleInfoReport { bundle: None };
        let msg = report.to_message().unwrap();
        assert_eq!(CommandFrame::parse(&msg).unwrap().payload, &[0]);
        assert_eq!(through_wire(&report), report);
    }

    #[test]
    fn test_download_start_carries_four_byte_total() {
        let start = DownloadStart {
            bundle: Some((
                BundleInfo {
                    identity: "abc".into(),
                    display_name: "Stage".into(),
                },
                600_000,
            )),
        };
        let msg = start.to_message().unwrap();
        let payload = CommandFrame::parse(&msg).unwrap().payload;
        assert_eq!(&payload[payload.len() - 4..], &600_000u32.to_le_bytes());
        assert_eq!(through_wire(&start), start);
    }

    #[test]
    fn test_download_start_truncated_total_fails() {
        let mut buf = BytesMut::new();
        buf.put_wire_bool(true);
        buf.put_wire_str("abc");
        buf.put_wire_str("Stage");
        buf.put_u16_le(7);
        assert!(DownloadStart::read(&buf).is_err());
    }

    #[test]
    fn test_chunk_message_payload_is_raw_bytes() {
        let msg = download_chunk_message(&[1, 2, 3]);
        let frame = CommandFrame::parse(&msg).unwrap();
        assert_eq!(frame.command, command::REPORT_ASSET_BUNDLE_DOWNLOAD_DATA);
        assert_eq!(frame.payload, &[1, 2, 3]);
    }

    #[test]
    fn test_perf_report_is_json_inside_command() {
        let report = PerfReport {
            frame_count: 60,
            durations: vec![DurationEntry {
                name: "Frame".into(),
                millis: 16.5,
            }],
            event_counts: vec![CountEntry {
                name: "Frames".into(),
                count: 60,
            }],
            ..PerfReport::default()
        };
        let msg = report.to_message().unwrap();
        let frame = CommandFrame::parse(&msg).unwrap();
        let json: serde_json::Value = serde_json::from_slice(frame.payload).unwrap();
        assert_eq!(json["frame_count"], 60);
        assert_eq!(json["durations"][0]["name"], "Frame");
        assert_eq!(through_wire(&report), report);
    }

    #[test]
    fn test_perf_report_garbage_is_decode_error() {
        let err = PerfReport::read(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_perf_diagnostics_toggle() {
        for enabled in [true, false] {
            let msg = PerfDiagnostics { enabled };
            assert_eq!(through_wire(&msg), msg);
        }
    }
}
