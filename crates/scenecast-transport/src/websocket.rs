//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each connection is split into a reader task, which turns binary frames
//! into [`ConnectionEvent::Data`] on the endpoint's queue, and a writer
//! task fed by an unbounded channel so [`Connection::send`] never awaits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Connection, ConnectionEvent, ConnectionId, EventSender, TransportError,
};

/// A single WebSocket connection, as seen by the endpoint.
#[derive(Debug)]
pub struct WebSocketConnection {
    id: ConnectionId,
    remote: String,
    outbound: mpsc::UnboundedSender<Bytes>,
    connected: Arc<AtomicBool>,
}

impl Connection for WebSocketConnection {
    fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        self.outbound
            .send(Bytes::copy_from_slice(data))
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

/// Accepts spectator connections on a TCP port.
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    /// Returns the local address, useful after binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::ConnectFailed)
    }

    /// Accepts connections until the event queue's consumer goes away.
    ///
    /// Handshake failures are logged and skipped; they never stop the loop.
    pub async fn run(
        self,
        events: EventSender<WebSocketConnection>,
    ) -> Result<(), TransportError> {
        loop {
            let (stream, addr) = tokio::select! {
                accepted = self.listener.accept() => {
                    accepted.map_err(TransportError::ConnectFailed)?
                }
                () = events.closed() => return Ok(()),
            };

            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    spawn_connection(ws, addr.to_string(), events.clone())?;
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "WebSocket handshake failed");
                }
            }
        }
    }
}

/// Dials a host at `url` (for example `ws://192.168.1.20:7410`).
///
/// On success the new connection is announced on `events` as
/// `Connected`, exactly like an accepted one.
pub async fn connect(
    url: &str,
    events: EventSender<WebSocketConnection>,
) -> Result<ConnectionId, TransportError> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
        TransportError::ConnectFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;
    spawn_connection(ws, url.to_string(), events)
}

fn spawn_connection<S>(
    ws: WebSocketStream<S>,
    remote: String,
    events: EventSender<WebSocketConnection>,
) -> Result<ConnectionId, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = ConnectionId::next();
    let connected = Arc::new(AtomicBool::new(true));
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();
    let (mut sink, mut stream) = ws.split();

    tracing::debug!(%id, %remote, "WebSocket connection up");
    events.push(ConnectionEvent::Connected(WebSocketConnection {
        id,
        remote,
        outbound: outbound_tx,
        connected: Arc::clone(&connected),
    }))?;

    let writer_connected = Arc::clone(&connected);
    tokio::spawn(async move {
        while let Some(data) = outbound_rx.recv().await {
            if let Err(e) = sink.send(Message::Binary(data)).await {
                tracing::debug!(%id, error = %e, "WebSocket write failed");
                break;
            }
        }
        writer_connected.store(false, Ordering::Release);
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    if events.push(ConnectionEvent::Data(id, data)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue, // skip text/ping/pong/frame
                Some(Err(e)) => {
                    tracing::debug!(%id, error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
        connected.store(false, Ordering::Release);
        let _ = events.push(ConnectionEvent::Disconnected(id));
        tracing::debug!(%id, "WebSocket connection down");
    });

    Ok(id)
}
