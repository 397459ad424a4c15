//! Stream Client
//!
//! Runtime handle around [`SubscriptionChannel`]. The channel lives inside
//! a single dispatch task that owns it outright; callers talk to it through
//! an unbounded command queue, so every handle method is synchronous and
//! never blocks.
//!
//! ```text
//! StreamClient ──commands──┐
//! transport ────events─────┼──► dispatch loop ──► SubscriptionChannel ──► consumers
//! timer ────────fired──────┘
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::timer::TokioReconnectTimer;
use super::transport::WebSocketTransport;
use crate::application::ports::{ConnectionEvent, ReconnectTimer, Transport};
use crate::application::services::{ReconnectConfig, SubscriptionChannel};
use crate::domain::connection::{ConnectionState, TimerToken};
use crate::domain::subscription::{Symbol, SymbolConsumer, Timeframe};
use crate::infrastructure::config::ClientConfig;

/// How long shutdown waits for the socket to close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Request from a [`StreamClient`] handle to the dispatch loop.
#[derive(Debug)]
pub enum ClientCommand {
    /// Register a consumer and subscribe.
    Subscribe {
        /// Symbol to stream.
        symbol: Symbol,
        /// Handlers for the symbol.
        consumer: SymbolConsumer,
        /// Timeframe, or the configured default.
        timeframe: Option<Timeframe>,
    },
    /// Drop a symbol.
    Unsubscribe(Symbol),
    /// Change a symbol's timeframe and request a fresh chart.
    RequestChart {
        /// Symbol to re-chart.
        symbol: Symbol,
        /// New timeframe.
        timeframe: Timeframe,
    },
    /// Dial if not already connecting or open.
    Connect,
}

/// Handle to a running subscription channel.
///
/// Cheap to clone; all clones drive the same channel.
#[derive(Debug, Clone)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Start a client for `config` on the current tokio runtime.
    ///
    /// No connection is made until the first subscription. The returned
    /// handle resolves once the dispatch loop has exited after
    /// [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn spawn(config: &ClientConfig) -> (Self, JoinHandle<()>) {
        let capacity = config.stream.event_capacity;
        let cancel = CancellationToken::new();

        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (timer_tx, timer_rx) = mpsc::channel(capacity);

        let transport = WebSocketTransport::new(event_tx, cancel.child_token());
        let timer = TokioReconnectTimer::new(timer_tx);

        let channel = SubscriptionChannel::new(
            config.endpoint().clone(),
            ReconnectConfig::from_settings(&config.reconnect),
            transport,
            timer,
        )
        .with_default_timeframe(config.stream.default_timeframe.clone());

        Self::spawn_with_channel(channel, event_rx, timer_rx, cancel)
    }

    /// Start a client around an already built channel.
    ///
    /// `events` and `fired` must be the queues the channel's transport and
    /// timer report into.
    #[must_use]
    pub fn spawn_with_channel<T, R>(
        channel: SubscriptionChannel<T, R>,
        events: mpsc::Receiver<ConnectionEvent>,
        fired: mpsc::Receiver<TimerToken>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        T: Transport + Send + 'static,
        R: ReconnectTimer + Send + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let connected = channel.connected();

        let dispatch = DispatchLoop {
            channel,
            commands: commands_rx,
            events,
            fired,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(dispatch.run());

        (
            Self {
                commands: commands_tx,
                connected,
                cancel,
            },
            handle,
        )
    }

    /// Subscribe `consumer` to `symbol` with the default timeframe.
    pub fn subscribe(&self, symbol: impl Into<Symbol>, consumer: SymbolConsumer) {
        self.submit(ClientCommand::Subscribe {
            symbol: symbol.into(),
            consumer,
            timeframe: None,
        });
    }

    /// Subscribe `consumer` to `symbol` with an explicit timeframe.
    pub fn subscribe_with_timeframe(
        &self,
        symbol: impl Into<Symbol>,
        consumer: SymbolConsumer,
        timeframe: impl Into<Timeframe>,
    ) {
        self.submit(ClientCommand::Subscribe {
            symbol: symbol.into(),
            consumer,
            timeframe: Some(timeframe.into()),
        });
    }

    /// Stop streaming `symbol` and drop its consumer.
    pub fn unsubscribe(&self, symbol: impl Into<Symbol>) {
        self.submit(ClientCommand::Unsubscribe(symbol.into()));
    }

    /// Change the timeframe for `symbol` and request a fresh chart.
    pub fn request_chart(&self, symbol: impl Into<Symbol>, timeframe: impl Into<Timeframe>) {
        self.submit(ClientCommand::RequestChart {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        });
    }

    /// Dial now instead of waiting for the first subscription.
    pub fn connect(&self) {
        self.submit(ClientCommand::Connect);
    }

    /// Watch the connected flag.
    #[must_use]
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Whether the connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Close the connection, stop reconnecting and end the dispatch loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn submit(&self, command: ClientCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Dispatch loop has stopped, dropping client command");
        }
    }
}

// =============================================================================
// Dispatch Loop
// =============================================================================

struct DispatchLoop<T, R> {
    channel: SubscriptionChannel<T, R>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::Receiver<ConnectionEvent>,
    fired: mpsc::Receiver<TimerToken>,
    cancel: CancellationToken,
}

impl<T: Transport, R: ReconnectTimer> DispatchLoop<T, R> {
    async fn run(mut self) {
        tracing::debug!(endpoint = %self.channel.endpoint(), "Dispatch loop started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.close().await;
                    break;
                }
                Some(event) = self.events.recv() => {
                    self.channel.handle_event(event);
                }
                Some(token) = self.fired.recv() => {
                    self.channel.reconnect_due(token);
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All client handles dropped");
                        self.close().await;
                        break;
                    };
                    self.apply(command);
                }
            }
        }

        tracing::info!("Stream client stopped");
    }

    /// Shut the channel down and wait for the socket to report closed.
    async fn close(&mut self) {
        self.channel.shutdown();

        let drain = async {
            while self.channel.state() != ConnectionState::Absent {
                let Some(event) = self.events.recv().await else {
                    break;
                };
                self.channel.handle_event(event);
            }
        };

        if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
            tracing::warn!(
                timeout_secs = CLOSE_TIMEOUT.as_secs(),
                "Connection did not close in time"
            );
        }
    }

    fn apply(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Subscribe {
                symbol,
                consumer,
                timeframe,
            } => self.channel.subscribe(symbol, consumer, timeframe),
            ClientCommand::Unsubscribe(symbol) => self.channel.unsubscribe(&symbol),
            ClientCommand::RequestChart { symbol, timeframe } => {
                self.channel.request_chart(symbol, timeframe);
            }
            ClientCommand::Connect => self.channel.ensure_connected(),
        }
    }
}
