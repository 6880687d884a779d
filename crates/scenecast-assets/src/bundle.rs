//! The bundle container: a flat list of typed, named asset entries.
//!
//! ```text
//! "SCB1"                       magic
//! u32 LE                       entry count
//! per entry:
//!   string                     type tag   (7-bit length + UTF-8)
//!   string                     asset id
//!   u32 LE                     data length
//!   [u8; len]                  serialized asset
//! ```
//!
//! The bytes of each entry are opaque here; a codec registered for the
//! type tag gives them meaning.

use bytes::{BufMut, Bytes, BytesMut};
use scenecast_protocol::BundleInfo;
use scenecast_protocol::wire::{WireReader, WireWrite};

use crate::AssetError;

const MAGIC: &[u8; 4] = b"SCB1";

/// A built bundle ready to be served: its identity plus its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub info: BundleInfo,
    pub data: Bytes,
}

impl Bundle {
    /// Wraps already-serialized bundle bytes, deriving the identity from
    /// their content.
    pub fn from_bytes(display_name: impl Into<String>, data: Bytes) -> Self {
        Self {
            info: BundleInfo {
                identity: content_identity(&data),
                display_name: display_name.into(),
            },
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One entry, borrowing from the bundle bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleEntry<'a> {
    pub type_tag: &'a str,
    pub asset_id: &'a str,
    pub data: &'a [u8],
}

/// Builds a bundle from serialized assets.
#[derive(Debug, Default)]
pub struct BundleWriter {
    count: u32,
    body: BytesMut,
}

impl BundleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one asset. Entries keep insertion order.
    pub fn add(&mut self, type_tag: &str, asset_id: &str, data: &[u8]) -> &mut Self {
        self.body.reserve(type_tag.len() + asset_id.len() + data.len() + 10);
        self.body.put_wire_str(type_tag);
        self.body.put_wire_str(asset_id);
        self.body.put_u32_le(data.len() as u32);
        self.body.put_slice(data);
        self.count += 1;
        self
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Seals the bundle and computes its identity.
    pub fn finish(&self, display_name: impl Into<String>) -> Bundle {
        let mut out = BytesMut::with_capacity(8 + self.body.len());
        out.put_slice(MAGIC);
        out.put_u32_le(self.count);
        out.put_slice(&self.body);
        Bundle::from_bytes(display_name, out.freeze())
    }
}

/// Parses every entry of a bundle.
///
/// # Errors
/// Fails on a bad header, a truncated entry, or trailing garbage.
pub fn read_entries(data: &[u8]) -> Result<Vec<BundleEntry<'_>>, AssetError> {
    let mut r = WireReader::new(data);
    if r.remaining() < MAGIC.len() || r.read_bytes(MAGIC.len())? != MAGIC {
        return Err(AssetError::BadMagic);
    }
    let count = r.read_u32()?;
    // Each entry takes at least six bytes; don't trust a huge count.
    let mut entries = Vec::with_capacity((count as usize).min(r.remaining() / 6));
    for _ in 0..count {
        let type_tag = r.read_str()?;
        let asset_id = r.read_str()?;
        let len = r.read_u32()? as usize;
        let data = r.read_bytes(len)?;
        entries.push(BundleEntry {
            type_tag,
            asset_id,
            data,
        });
    }
    if r.remaining() > 0 {
        return Err(AssetError::TrailingBytes(r.remaining()));
    }
    Ok(entries)
}

/// Hex-encoded 64-bit FNV-1a hash of `data`.
///
/// Equal bytes give equal identities; that is all the protocol needs.
pub fn content_identity(data: &[u8]) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let hash = data
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME));
    format!("{hash:016x}")
}
