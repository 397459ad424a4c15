//! WebSocket Transport
//!
//! [`Transport`] implementation on `tokio-tungstenite`. Every `open` spawns
//! one connection task that dials, then pumps outbound frames from a
//! bounded queue and inbound frames into the shared event queue until the
//! socket ends or the connection is closed.
//!
//! Each task reports exactly one [`ConnectionEvent::Closed`] as its last
//! event, whether the dial failed, the server hung up or `close` was called.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::application::ports::{ConnectionEvent, Transport, TransportError};
use crate::domain::connection::ConnectionId;

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

struct ConnectionHandle {
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

/// WebSocket transport reporting into an event queue.
pub struct WebSocketTransport {
    events: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
    outbound_capacity: usize,
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl WebSocketTransport {
    /// Create a transport that reports into `events`.
    ///
    /// Cancelling `cancel` closes every connection the transport opened.
    #[must_use]
    pub fn new(events: mpsc::Sender<ConnectionEvent>, cancel: CancellationToken) -> Self {
        Self {
            events,
            cancel,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            connections: HashMap::new(),
        }
    }

    /// Set the per-connection outbound queue capacity.
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Number of connections whose task is still running.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.connections
            .values()
            .filter(|handle| !handle.outbound.is_closed())
            .count()
    }

    fn prune_finished(&mut self) {
        self.connections
            .retain(|_, handle| !handle.outbound.is_closed());
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, id: ConnectionId, url: &Url) {
        self.prune_finished();

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let cancel = self.cancel.child_token();

        self.connections.insert(
            id,
            ConnectionHandle {
                outbound: outbound_tx,
                cancel: cancel.clone(),
            },
        );

        tokio::spawn(run_connection(
            id,
            url.as_str().to_owned(),
            outbound_rx,
            self.events.clone(),
            cancel,
        ));
    }

    fn send(&mut self, id: ConnectionId, frame: String) -> Result<(), TransportError> {
        let handle = self
            .connections
            .get(&id)
            .ok_or(TransportError::NotConnected(id))?;

        handle.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull(id),
            mpsc::error::TrySendError::Closed(_) => TransportError::WriterClosed(id),
        })
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(handle) = self.connections.remove(&id) {
            handle.cancel.cancel();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        for handle in self.connections.values() {
            handle.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("outbound_capacity", &self.outbound_capacity)
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection Task
// =============================================================================

async fn run_connection(
    id: ConnectionId,
    url: String,
    outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
) {
    if let Err(error) = pump(id, &url, outbound, &events, &cancel).await {
        tracing::debug!(connection_id = %id, error = %error, "Connection ended with error");
        emit(&events, ConnectionEvent::Errored { id, error }).await;
    }
    emit(&events, ConnectionEvent::Closed { id }).await;
}

/// Dial and pump frames until the socket ends. A returned error is the
/// reason the connection failed.
async fn pump(
    id: ConnectionId,
    url: &str,
    mut outbound: mpsc::Receiver<String>,
    events: &mpsc::Sender<ConnectionEvent>,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let dialed = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(connection_id = %id, "Dial cancelled");
            return Ok(());
        }
        result = tokio_tungstenite::connect_async(url) => result,
    };

    let (ws_stream, _response) = dialed.map_err(|e| e.to_string())?;
    let (mut write, mut read) = ws_stream.split();

    emit(events, ConnectionEvent::Opened { id }).await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(connection_id = %id, error = %e, "Failed to send close frame");
                }
                return Ok(());
            }
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(connection_id = %id, error = %e, "Failed to send close frame");
                    }
                    return Ok(());
                };
                write
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        emit(events, ConnectionEvent::Frame {
                            id,
                            text: text.as_str().to_owned(),
                        })
                        .await;
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            emit(events, ConnectionEvent::Frame {
                                id,
                                text: text.to_owned(),
                            })
                            .await;
                        }
                        Err(e) => {
                            tracing::warn!(
                                connection_id = %id,
                                bytes = data.len(),
                                error = %e,
                                "Discarding non UTF-8 binary frame"
                            );
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| e.to_string())?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(
                            connection_id = %id,
                            reason = frame.as_ref().map_or("", |f| f.reason.as_str()),
                            "Server sent close frame"
                        );
                        return Ok(());
                    }
                    Some(Ok(_)) => {
                        // Pong and raw frames carry nothing for us
                    }
                    Some(Err(e)) => return Err(e.to_string()),
                    None => {
                        tracing::debug!(connection_id = %id, "WebSocket stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn emit(events: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) {
    if events.send(event).await.is_err() {
        tracing::trace!("Event receiver dropped");
    }
}

// =============================================================================
// Tests
// =============================================================================
