//! In-memory connection pair.
//!
//! Both ends deliver straight into the other side's [`EventQueue`], which
//! gives the same ordered, message-preserving semantics as a real socket
//! without any I/O. Endpoint tests and single-process demos use it.
//!
//! [`EventQueue`]: crate::EventQueue

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use crate::{Connection, ConnectionEvent, ConnectionId, EventSender, TransportError};

/// One end of an in-memory link.
#[derive(Debug)]
pub struct LoopbackConnection {
    id: ConnectionId,
    remote: String,
    /// Id the peer knows this link by; inbound data is tagged with it.
    peer_id: ConnectionId,
    peer_events: EventSender<LoopbackConnection>,
    /// Shared by both ends: dropping the link is visible from either side.
    connected: Arc<AtomicBool>,
}

impl LoopbackConnection {
    /// Tears the link down and notifies both sides.
    ///
    /// Idempotent: only the first call pushes `Disconnected` events.
    pub fn disconnect(&self, own_events: &EventSender<LoopbackConnection>) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::debug!(id = %self.id, "loopback link closed");
            let _ = own_events.push(ConnectionEvent::Disconnected(self.id));
            let _ = self
                .peer_events
                .push(ConnectionEvent::Disconnected(self.peer_id));
        }
    }
}

impl Connection for LoopbackConnection {
    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        self.peer_events
            .push(ConnectionEvent::Data(
                self.peer_id,
                Bytes::copy_from_slice(data),
            ))
            .map_err(|_| TransportError::ConnectionClosed(self.id))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn remote(&self) -> &str {
        &self.remote
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Links two event queues and announces the link on both.
///
/// Each side receives `Connected` carrying its own end. The returned ids
/// are `(host-side id, spectator-side id)`.
///
/// # Errors
/// Returns [`TransportError::QueueClosed`] if either consumer is gone.
pub fn loopback_pair(
    host_events: &EventSender<LoopbackConnection>,
    spectator_events: &EventSender<LoopbackConnection>,
) -> Result<(ConnectionId, ConnectionId), TransportError> {
    let host_id = ConnectionId::next();
    let spectator_id = ConnectionId::next();
    let connected = Arc::new(AtomicBool::new(true));

    let host_end = LoopbackConnection {
        id: host_id,
        remote: format!("loopback:{spectator_id}"),
        peer_id: spectator_id,
        peer_events: spectator_events.clone(),
        connected: Arc::clone(&connected),
    };
    let spectator_end = LoopbackConnection {
        id: spectator_id,
        remote: format!("loopback:{host_id}"),
        peer_id: host_id,
        peer_events: host_events.clone(),
        connected,
    };

    host_events.push(ConnectionEvent::Connected(host_end))?;
    spectator_events.push(ConnectionEvent::Connected(spectator_end))?;
    Ok((host_id, spectator_id))
}
