//! Transport boundary for Scenecast.
//!
//! The protocol engine never owns a socket. It sees a connection only
//! through the [`Connection`] trait (send bytes, report identity and
//! liveness) and learns about the outside world through
//! [`ConnectionEvent`]s that a transport pushes into an [`EventQueue`].
//! The endpoint drains that queue once at the start of every tick, so
//! every state mutation triggered by inbound bytes happens on the tick
//! thread even when the transport delivers from a Tokio task.
//!
//! ```text
//! transport task ──push──→ EventQueue ──drain (once per tick)──→ endpoint
//! endpoint ──Connection::send (non-blocking)──→ transport task
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
mod loopback;
mod queue;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use loopback::{LoopbackConnection, loopback_pair};
pub use queue::{ConnectionEvent, EventQueue, EventSender, event_queue};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketListener, connect};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating process-unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next unused id in this process.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live, ordered, reliable, message-preserving link to one peer.
///
/// Owned by the transport. Sending never blocks: implementations hand the
/// bytes to their own writer and return immediately, so a tick can push
/// several messages without stalling the frame.
pub trait Connection: Send + Sync + 'static {
    /// Queues one message for delivery to the remote peer.
    ///
    /// Each call is one message on the wire; the transport preserves the
    /// boundary.
    fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Returns `true` while the link is up.
    fn is_connected(&self) -> bool;

    /// Human-readable remote identity (address, device name, ...).
    fn remote(&self) -> &str;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
