//! The single-producer/single-consumer handoff between a transport and the
//! tick thread.
//!
//! Transports may deliver bytes from any task or thread. They never touch
//! endpoint state directly: they push a [`ConnectionEvent`] and the
//! endpoint drains everything that accumulated at the start of its next
//! tick. The queue is unbounded because draining is already rate-limited
//! by the tick; bounding it here would only move backpressure into the
//! socket reader.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{ConnectionId, TransportError};

/// Something a transport observed on one of its connections.
#[derive(Debug)]
pub enum ConnectionEvent<C> {
    /// A new link is up. The endpoint takes ownership of the handle.
    Connected(C),
    /// One complete inbound message.
    Data(ConnectionId, Bytes),
    /// The link went down. Always the last event for that id.
    Disconnected(ConnectionId),
}

/// Producer half, held by the transport.
#[derive(Debug)]
pub struct EventSender<C> {
    tx: mpsc::UnboundedSender<ConnectionEvent<C>>,
}

impl<C> Clone for EventSender<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> EventSender<C> {
    /// Pushes an event for the next drain.
    ///
    /// # Errors
    /// Returns [`TransportError::QueueClosed`] once the consumer is gone.
    pub fn push(&self, event: ConnectionEvent<C>) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::QueueClosed)
    }

    /// Returns `true` if the consuming endpoint has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consuming endpoint has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Consumer half, owned by the endpoint and drained on its tick thread.
#[derive(Debug)]
pub struct EventQueue<C> {
    rx: mpsc::UnboundedReceiver<ConnectionEvent<C>>,
}

impl<C> EventQueue<C> {
    /// Takes the events queued at the time of the call without waiting.
    ///
    /// Events pushed while the returned iterator is being consumed stay
    /// queued for the next drain, so a busy producer cannot stretch a tick.
    pub fn drain(&mut self) -> impl Iterator<Item = ConnectionEvent<C>> + '_ {
        let pending = self.rx.len();
        (0..pending).map_while(move |_| self.rx.try_recv().ok())
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Waits for the next event. Used by drivers that sleep between bursts.
    pub async fn recv(&mut self) -> Option<ConnectionEvent<C>> {
        self.rx.recv().await
    }
}

/// Creates a connected producer/consumer pair.
pub fn event_queue<C>() -> (EventSender<C>, EventQueue<C>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventQueue { rx })
}
