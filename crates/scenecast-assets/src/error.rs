//! Error types for bundle handling.

use scenecast_protocol::ProtocolError;

/// Errors raised while building, parsing, or materializing a bundle.
///
/// None of these escape an endpoint tick: the receiver turns them into an
/// `ErrorLoadingAssetBundle` state carrying the message text.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The bundle bytes do not start with the container header.
    #[error("not a bundle: bad header")]
    BadMagic,

    /// An entry or the header was cut short or malformed.
    #[error("malformed bundle: {0}")]
    Malformed(#[from] ProtocolError),

    /// Bytes left over after the declared entries.
    #[error("malformed bundle: {0} trailing bytes after the last entry")]
    TrailingBytes(usize),

    /// An entry's type tag has no codec in the registry.
    #[error("no codec registered for asset type {0:?}")]
    UnknownType(String),

    /// A codec rejected an entry's bytes.
    #[error("codec {tag:?} rejected asset {id:?}: {reason}")]
    Decode {
        tag: String,
        id: String,
        reason: String,
    },

    /// Two codecs claimed the same type tag.
    #[error("a codec is already registered for asset type {0:?}")]
    DuplicateCodec(String),

    /// The bundle is larger than the transfer header can describe.
    #[error("bundle of {0} bytes exceeds the 4 GiB transfer limit")]
    TooLarge(usize),
}
