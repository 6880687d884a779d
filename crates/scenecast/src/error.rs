//! Unified error type for Scenecast.

use scenecast_assets::AssetError;
use scenecast_protocol::ProtocolError;
use scenecast_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// Only setup and explicit sends return it. The per-tick entry points
/// log failures and keep going.
#[derive(Debug, thiserror::Error)]
pub enum ScenecastError {
    /// A transport-level error (connect, send, closed queue).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, payload decode, registration).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A bundle-level error (catalog, container, codec).
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// An operation that needs a live connection was called without one.
    #[error("not connected")]
    NotConnected,
}

#[cfg(test)]
mod tests {
    use scenecast_transport::ConnectionId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed(ConnectionId::new(9));
        let err: ScenecastError = err.into();
        assert!(matches!(err, ScenecastError::Transport(_)));
        assert!(err.to_string().contains("conn-9"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: ScenecastError = ProtocolError::DuplicateHandler("SYNC".into()).into();
        assert!(matches!(err, ScenecastError::Protocol(_)));
        assert!(err.to_string().contains("SYNC"));
    }

    #[test]
    fn test_from_asset_error() {
        let err: ScenecastError = AssetError::UnknownType("mesh".into()).into();
        assert!(matches!(err, ScenecastError::Asset(_)));
    }
}
