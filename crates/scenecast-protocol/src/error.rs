//! Error types for the protocol layer.
//!
//! Everything that can go wrong turning bytes into commands (or back) ends
//! up here. Endpoints log these and drop the offending message; they never
//! tear a connection down over one bad packet.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message ended before a field could be read.
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A length prefix used more than five bytes or overflowed `u32`.
    #[error("malformed length prefix")]
    BadLength,

    /// A command identifier was empty or longer than the protocol allows.
    #[error("invalid command identifier length {0}")]
    InvalidIdentifier(usize),

    /// A platform byte that maps to no known platform.
    #[error("unknown platform id {0}")]
    UnknownPlatform(u8),

    /// Serializing the telemetry record failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserializing the telemetry record failed.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Decoding succeeded but the message violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A handler is already registered for this identifier.
    #[error("a handler is already registered for command {0:?}")]
    DuplicateHandler(String),
}
