//! Stream Client Integration Tests
//!
//! Drives a real `StreamClient` against an in-process WebSocket server and
//! checks the wire protocol, routing, reconnect replay and shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use stock_stream_client::{
    ClientConfig, ReconnectSettings, StreamClient, StreamSettings, SymbolConsumer,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Fake Server
// =============================================================================

enum ServerAction {
    Push(String),
    /// Drop the TCP stream without a close handshake.
    Kill,
}

/// One accepted client connection as seen by the server.
struct ServerConnection {
    received: mpsc::UnboundedReceiver<Value>,
    actions: mpsc::UnboundedSender<ServerAction>,
}

impl ServerConnection {
    async fn next_command(&mut self) -> Value {
        timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a command")
            .expect("connection ended before a command arrived")
    }

    /// Wait for the client to go away; returns commands seen meanwhile.
    async fn closed(mut self) -> Vec<Value> {
        let mut seen = Vec::new();
        while let Some(command) = timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for the client to close")
        {
            seen.push(command);
        }
        seen
    }

    fn push(&self, frame: impl Into<String>) {
        self.actions.send(ServerAction::Push(frame.into())).unwrap();
    }

    fn kill(&self) {
        self.actions.send(ServerAction::Kill).unwrap();
    }
}

struct FakeServer {
    origin: String,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
}

impl FakeServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (received_tx, received_rx) = mpsc::unbounded_channel();
                let (actions_tx, actions_rx) = mpsc::unbounded_channel();
                tokio::spawn(serve(ws, received_tx, actions_rx));
                if conn_tx
                    .send(ServerConnection {
                        received: received_rx,
                        actions: actions_tx,
                    })
                    .is_err()
                {
                    return;
                }
            }
        });

        Self {
            origin,
            connections: conn_rx,
        }
    }

    async fn accept(&mut self) -> ServerConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for the client to connect")
            .unwrap()
    }

    fn config(&self) -> ClientConfig {
        ClientConfig {
            stream: StreamSettings::for_origin(&self.origin).unwrap(),
            reconnect: ReconnectSettings {
                delay_initial: Duration::from_millis(100),
                delay_max: Duration::from_millis(100),
                ..ReconnectSettings::default()
            },
            metrics_port: 0,
        }
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    received: mpsc::UnboundedSender<Value>,
    mut actions: mpsc::UnboundedReceiver<ServerAction>,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = received.send(serde_json::from_str(text.as_str()).unwrap());
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            action = actions.recv() => match action {
                Some(ServerAction::Push(frame)) => {
                    if write.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                Some(ServerAction::Kill) | None => return,
            },
        }
    }
}

// =============================================================================
// Consumers
// =============================================================================

#[derive(Debug, PartialEq)]
enum Delivery {
    Chart(Value),
    Tick(Value),
}

fn channel_consumer() -> (SymbolConsumer, mpsc::UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let chart_tx = tx.clone();
    let consumer = SymbolConsumer::new()
        .on_chart(move |chart| {
            let _ = chart_tx.send(Delivery::Chart(chart.into_inner()));
        })
        .on_tick(move |tick| {
            let _ = tx.send(Delivery::Tick(tick.into_payload()));
        });
    (consumer, rx)
}

async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn wait_connected(client: &StreamClient, expected: bool) {
    let mut connected = client.connected();
    timeout(WAIT, connected.wait_for(|c| *c == expected))
        .await
        .expect("timed out waiting for connection status")
        .unwrap();
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn subscribe_sends_command_and_routes_envelopes() {
    let mut server = FakeServer::start().await;
    let (client, _task) = StreamClient::spawn(&server.config());

    let (samsung, mut samsung_rx) = channel_consumer();
    let (hynix, mut hynix_rx) = channel_consumer();
    client.subscribe("005930", samsung);
    client.subscribe_with_timeframe("000660", hynix, "W");

    let mut conn = server.accept().await;
    assert_eq!(
        conn.next_command().await,
        json!({"type": "subscribe", "symbol": "005930", "timeframe": "D"})
    );
    assert_eq!(
        conn.next_command().await,
        json!({"type": "subscribe", "symbol": "000660", "timeframe": "W"})
    );
    wait_connected(&client, true).await;

    conn.push(r#"{"type":"chart","symbol":"005930","data":{"output":[1,2,3]}}"#);
    conn.push(r#"{"type":"tick","data":{"symbol":"000660","price":123000}}"#);

    assert_eq!(
        next_delivery(&mut samsung_rx).await,
        Delivery::Chart(json!({"output": [1, 2, 3]}))
    );
    assert_eq!(
        next_delivery(&mut hynix_rx).await,
        Delivery::Tick(json!({"symbol": "000660", "price": 123_000}))
    );
    assert!(samsung_rx.try_recv().is_err());

    client.shutdown();
}

#[tokio::test]
async fn reconnect_replays_latest_intents() {
    let mut server = FakeServer::start().await;
    let (client, _task) = StreamClient::spawn(&server.config());

    client.subscribe("005930", SymbolConsumer::new());
    client.subscribe("000660", SymbolConsumer::new());

    let mut first = server.accept().await;
    first.next_command().await;
    first.next_command().await;
    wait_connected(&client, true).await;

    client.request_chart("005930", "W");
    assert_eq!(
        first.next_command().await,
        json!({"type": "requestChart", "symbol": "005930", "timeframe": "W"})
    );
    client.unsubscribe("000660");
    assert_eq!(
        first.next_command().await,
        json!({"type": "unsubscribe", "symbol": "000660"})
    );

    first.kill();

    let mut second = server.accept().await;
    assert_eq!(
        second.next_command().await,
        json!({"type": "subscribe", "symbol": "005930", "timeframe": "W"})
    );
    wait_connected(&client, true).await;

    client.shutdown();
    assert!(second.closed().await.is_empty());
}

#[tokio::test]
async fn malformed_frames_do_not_break_the_connection() {
    let mut server = FakeServer::start().await;
    let (client, _task) = StreamClient::spawn(&server.config());

    let (consumer, mut rx) = channel_consumer();
    client.subscribe("005930", consumer);

    let mut conn = server.accept().await;
    conn.next_command().await;

    conn.push("definitely not json");
    conn.push(r#"{"type":"tick","data":{"price":1}}"#);
    conn.push(r#"{"type":"orderbook","symbol":"005930"}"#);
    conn.push(r#"{"type":"tick","data":{"symbol":"999999","price":2}}"#);
    conn.push(r#"{"type":"tick","data":{"symbol":"005930","price":3}}"#);

    assert_eq!(
        next_delivery(&mut rx).await,
        Delivery::Tick(json!({"symbol": "005930", "price": 3}))
    );
    assert!(client.is_connected());

    client.shutdown();
}

#[tokio::test]
async fn shutdown_closes_socket_and_stops_reconnecting() {
    let mut server = FakeServer::start().await;
    let (client, task) = StreamClient::spawn(&server.config());

    client.subscribe("005930", SymbolConsumer::new());
    let mut conn = server.accept().await;
    conn.next_command().await;
    wait_connected(&client, true).await;

    client.shutdown();
    conn.closed().await;
    timeout(WAIT, task).await.unwrap().unwrap();
    assert!(!client.is_connected());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(server.connections.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_server_keeps_retrying_until_it_appears() {
    // Reserve a port, then free it so the first dials are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig {
        stream: StreamSettings::for_origin(&format!("http://{addr}")).unwrap(),
        reconnect: ReconnectSettings {
            delay_initial: Duration::from_millis(50),
            delay_max: Duration::from_millis(50),
            ..ReconnectSettings::default()
        },
        metrics_port: 0,
    };
    let (client, _task) = StreamClient::spawn(&config);
    client.subscribe("005930", SymbolConsumer::new());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!client.is_connected());

    let listener = TcpListener::bind(addr).await.unwrap();
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let Some(Ok(Message::Text(text))) = timeout(WAIT, ws.next()).await.unwrap() else {
        panic!("expected a subscribe command");
    };
    let command: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(
        command,
        json!({"type": "subscribe", "symbol": "005930", "timeframe": "D"})
    );
    wait_connected(&client, true).await;

    client.shutdown();
}
