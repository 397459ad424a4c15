//! Subscription Channel
//!
//! Single-connection state machine that multiplexes per-symbol
//! subscriptions over one shared socket.
//!
//! The channel is driven entirely by discrete inputs, each handled to
//! completion before the next:
//!
//! - caller operations: [`subscribe`](SubscriptionChannel::subscribe),
//!   [`unsubscribe`](SubscriptionChannel::unsubscribe),
//!   [`request_chart`](SubscriptionChannel::request_chart),
//!   [`shutdown`](SubscriptionChannel::shutdown)
//! - transport events: [`handle_event`](SubscriptionChannel::handle_event)
//! - timer firings: [`reconnect_due`](SubscriptionChannel::reconnect_due)
//!
//! It never blocks and never returns errors to callers: commands that
//! cannot be sent are dropped, bad frames are discarded, and a lost
//! connection is redialed with every current intent replayed on open.

use std::time::Instant;

use tokio::sync::watch;
use url::Url;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{ConnectionEvent, ReconnectTimer, Transport};
use crate::domain::connection::{ConnectionId, ConnectionState, TimerToken};
use crate::domain::streaming::{Command, InboundEnvelope};
use crate::domain::subscription::{
    ConsumerRegistry, IntentRegistry, Symbol, SymbolConsumer, Timeframe,
};
use crate::infrastructure::metrics::{self, DiscardReason};
use crate::infrastructure::websocket::codec::JsonCodec;

/// Subscription channel over a [`Transport`] and a [`ReconnectTimer`].
pub struct SubscriptionChannel<T, R> {
    endpoint: Url,
    default_timeframe: Timeframe,
    transport: T,
    timer: R,
    codec: JsonCodec,
    policy: ReconnectPolicy,

    state: ConnectionState,
    connection: Option<ConnectionId>,
    next_connection: ConnectionId,
    pending_retry: Option<TimerToken>,
    next_token: TimerToken,
    reconnect_enabled: bool,

    intents: IntentRegistry,
    consumers: ConsumerRegistry,
    connected: watch::Sender<bool>,
}

impl<T: Transport, R: ReconnectTimer> SubscriptionChannel<T, R> {
    /// Create a channel for `endpoint`. No connection is made until the
    /// first subscription or an explicit [`ensure_connected`](Self::ensure_connected).
    #[must_use]
    pub fn new(endpoint: Url, reconnect: ReconnectConfig, transport: T, timer: R) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            endpoint,
            default_timeframe: Timeframe::default(),
            transport,
            timer,
            codec: JsonCodec::new(),
            policy: ReconnectPolicy::new(reconnect),
            state: ConnectionState::Absent,
            connection: None,
            next_connection: ConnectionId::new(1),
            pending_retry: None,
            next_token: TimerToken::new(1),
            reconnect_enabled: true,
            intents: IntentRegistry::new(),
            consumers: ConsumerRegistry::new(),
            connected,
        }
    }

    /// Timeframe used by [`subscribe`](Self::subscribe) when none is given.
    #[must_use]
    pub fn with_default_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.default_timeframe = timeframe;
        self
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Dial the endpoint unless a connection is already connecting or open.
    pub fn ensure_connected(&mut self) {
        if self.state.is_live() {
            tracing::trace!(state = %self.state, "Connection already live, not dialing");
            return;
        }

        self.reconnect_enabled = true;
        self.cancel_pending_retry();

        let id = self.next_connection;
        self.next_connection = id.next();
        self.connection = Some(id);
        self.state = ConnectionState::Connecting;

        tracing::info!(connection_id = %id, url = %self.endpoint, "Connecting to stock stream");
        self.transport.open(id, &self.endpoint);
    }

    /// Feed a transport event into the channel.
    ///
    /// Events for any connection other than the current one are ignored.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        if self.connection != Some(event.id()) {
            tracing::debug!(
                connection_id = %event.id(),
                event = event.name(),
                "Ignoring event from superseded connection"
            );
            return;
        }

        match event {
            ConnectionEvent::Opened { id } => self.on_opened(id),
            ConnectionEvent::Frame { text, .. } => self.dispatch(&text),
            ConnectionEvent::Errored { id, error } => {
                tracing::warn!(connection_id = %id, error = %error, "Stock stream transport error");
            }
            ConnectionEvent::Closed { id } => self.on_closed(id),
        }
    }

    /// A scheduled reconnect fired.
    ///
    /// Tokens other than the currently pending one are stale and ignored.
    pub fn reconnect_due(&mut self, token: TimerToken) {
        if self.pending_retry != Some(token) {
            tracing::debug!(token = %token, "Ignoring stale reconnect timer");
            return;
        }

        self.pending_retry = None;
        tracing::info!(attempt = self.policy.attempt_count(), "Reconnecting to stock stream");
        self.ensure_connected();
    }

    /// Close the connection and stop reconnecting.
    ///
    /// A later [`subscribe`](Self::subscribe) or
    /// [`ensure_connected`](Self::ensure_connected) dials again.
    pub fn shutdown(&mut self) {
        self.reconnect_enabled = false;
        self.cancel_pending_retry();

        if !self.state.is_live() {
            return;
        }

        if let Some(id) = self.connection {
            tracing::info!(connection_id = %id, "Closing stock stream");
            self.state = ConnectionState::Closing;
            self.transport.close(id);
        }
    }

    fn on_opened(&mut self, id: ConnectionId) {
        if self.state != ConnectionState::Connecting {
            tracing::debug!(connection_id = %id, state = %self.state, "Ignoring open in unexpected state");
            return;
        }

        self.state = ConnectionState::Open;
        self.policy.reset();
        self.connected.send_replace(true);
        metrics::set_connected(true);

        tracing::info!(
            connection_id = %id,
            replaying = self.intents.len(),
            "Stock stream connected"
        );

        for command in self.intents.to_subscribe_commands() {
            self.send(&command);
        }
    }

    fn on_closed(&mut self, id: ConnectionId) {
        self.state = ConnectionState::Absent;
        self.connected.send_replace(false);
        metrics::set_connected(false);

        if !self.reconnect_enabled {
            tracing::info!(connection_id = %id, "Stock stream closed");
            return;
        }

        self.schedule_reconnect(id);
    }

    fn schedule_reconnect(&mut self, id: ConnectionId) {
        self.cancel_pending_retry();

        let Some(delay) = self.policy.next_delay() else {
            tracing::error!(
                connection_id = %id,
                attempts = self.policy.attempt_count(),
                "Reconnect attempts exhausted, staying disconnected"
            );
            return;
        };

        let token = self.next_token;
        self.next_token = token.next();
        self.pending_retry = Some(token);
        self.timer.schedule(token, delay);
        metrics::record_reconnect_scheduled();

        tracing::warn!(
            connection_id = %id,
            attempt = self.policy.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Stock stream disconnected, reconnect scheduled"
        );
    }

    fn cancel_pending_retry(&mut self) {
        if let Some(token) = self.pending_retry.take() {
            self.timer.cancel(token);
        }
    }

    // =========================================================================
    // Command Sender
    // =========================================================================

    /// Send a command if the connection is open, otherwise drop it.
    fn send(&mut self, command: &Command) {
        let (ConnectionState::Open, Some(id)) = (self.state, self.connection) else {
            tracing::debug!(
                command = command.kind(),
                symbol = %command.symbol(),
                state = %self.state,
                "Connection not open, dropping command"
            );
            metrics::record_command_dropped(command.kind());
            return;
        };

        let frame = match self.codec.encode(command) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(command = command.kind(), error = %e, "Failed to encode command");
                metrics::record_command_dropped(command.kind());
                return;
            }
        };

        if let Err(e) = self.transport.send(id, frame) {
            tracing::warn!(command = command.kind(), error = %e, "Failed to send command");
            metrics::record_command_dropped(command.kind());
            return;
        }

        tracing::debug!(
            connection_id = %id,
            command = command.kind(),
            symbol = %command.symbol(),
            "Command sent"
        );
        metrics::record_command_sent(command.kind());
    }

    // =========================================================================
    // Subscription Registry
    // =========================================================================

    /// Register `consumer` for `symbol` and start streaming it.
    ///
    /// Replaces any previous consumer and intent for the symbol. Uses the
    /// default timeframe when `timeframe` is `None`.
    pub fn subscribe(
        &mut self,
        symbol: Symbol,
        consumer: SymbolConsumer,
        timeframe: Option<Timeframe>,
    ) {
        let timeframe = timeframe.unwrap_or_else(|| self.default_timeframe.clone());

        if self.consumers.register(symbol.clone(), consumer).is_some() {
            tracing::debug!(symbol = %symbol, "Replacing existing consumer");
        }
        self.intents.upsert(symbol.clone(), timeframe.clone());

        match self.state {
            ConnectionState::Open => self.send(&Command::subscribe(symbol, timeframe)),
            ConnectionState::Connecting => {
                tracing::debug!(symbol = %symbol, "Connection pending, subscribe replays on open");
            }
            ConnectionState::Absent | ConnectionState::Closing => self.ensure_connected(),
        }
    }

    /// Forget `symbol`: drop its consumer and intent and tell the server.
    pub fn unsubscribe(&mut self, symbol: &Symbol) {
        self.consumers.remove(symbol);
        self.intents.remove(symbol);
        self.send(&Command::unsubscribe(symbol.clone()));
    }

    /// Change the timeframe for `symbol` and request a fresh chart.
    ///
    /// The consumer registration is left untouched.
    pub fn request_chart(&mut self, symbol: Symbol, timeframe: Timeframe) {
        self.intents.upsert(symbol.clone(), timeframe.clone());
        self.send(&Command::request_chart(symbol, timeframe));
    }

    // =========================================================================
    // Inbound Dispatcher
    // =========================================================================

    fn dispatch(&mut self, text: &str) {
        let started = Instant::now();
        metrics::record_frame_received();

        let envelope = match self.codec.decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, bytes = text.len(), "Discarding malformed message");
                metrics::record_message_discarded(DiscardReason::Malformed);
                return;
            }
        };

        let outcome = match envelope {
            InboundEnvelope::Chart { symbol, snapshot } => {
                self.consumers.get_mut(&symbol).map_or(
                    Err(DiscardReason::NoConsumer),
                    |consumer| {
                        if consumer.deliver_chart(snapshot) {
                            Ok("chart")
                        } else {
                            Err(DiscardReason::NoHandler)
                        }
                    },
                )
            }
            InboundEnvelope::Tick(tick) => {
                let symbol = tick.symbol().clone();
                self.consumers.get_mut(&symbol).map_or(
                    Err(DiscardReason::NoConsumer),
                    |consumer| {
                        if consumer.deliver_tick(tick) {
                            Ok("tick")
                        } else {
                            Err(DiscardReason::NoHandler)
                        }
                    },
                )
            }
            InboundEnvelope::Unknown(kind) => {
                tracing::trace!(kind = %kind, "Ignoring unknown message type");
                Err(DiscardReason::UnknownType)
            }
        };

        match outcome {
            Ok(kind) => metrics::record_envelope_dispatched(kind),
            Err(reason) => metrics::record_message_discarded(reason),
        }
        metrics::record_dispatch_duration(started.elapsed());
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch the connected flag. Receivers cannot change it.
    #[must_use]
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Current subscription intents.
    #[must_use]
    pub const fn intents(&self) -> &IntentRegistry {
        &self.intents
    }

    /// Whether a consumer is registered for `symbol`.
    #[must_use]
    pub fn has_consumer(&self, symbol: &Symbol) -> bool {
        self.consumers.contains(symbol)
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Id of the current (or last) connection attempt.
    #[must_use]
    pub const fn current_connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// Token of the pending reconnect, if one is scheduled.
    #[must_use]
    pub const fn pending_retry(&self) -> Option<TimerToken> {
        self.pending_retry
    }

    /// The endpoint this channel dials.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Borrow the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Borrow the reconnect timer.
    #[must_use]
    pub const fn timer(&self) -> &R {
        &self.timer
    }
}

impl<T, R> std::fmt::Debug for SubscriptionChannel<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionChannel")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state)
            .field("connection", &self.connection)
            .field("pending_retry", &self.pending_retry)
            .field("intents", &self.intents.len())
            .field("consumers", &self.consumers.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
