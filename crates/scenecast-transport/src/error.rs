/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection is no longer connected; the bytes were not queued.
    #[error("connection {0} is closed")]
    ConnectionClosed(crate::ConnectionId),

    /// Binding, accepting, or dialing a connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The event queue's consumer was dropped.
    #[error("event queue closed")]
    QueueClosed,
}
