//! Subscription Management Types
//!
//! Domain types for tracking what the caller wants to stream and who
//! receives the data.
//!
//! # Design
//!
//! Two registries are kept side by side:
//! - [`IntentRegistry`]: the desired subscription per symbol (symbol and
//!   timeframe). This is replayed to the server after every reconnect.
//! - [`ConsumerRegistry`]: the local handlers per symbol. Never sent over
//!   the wire, only used to dispatch inbound envelopes.
//!
//! Both are keyed by symbol and last writer wins.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::streaming::{ChartSnapshot, Command, Tick};

// =============================================================================
// Types
// =============================================================================

/// Timeframe used when the caller does not pick one (daily candles).
pub const DEFAULT_TIMEFRAME: &str = "D";

/// A stock symbol (e.g. `005930`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Borrow the symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chart timeframe requested from the server (e.g. `D`, `W`, `1`).
///
/// The value is opaque to the client and forwarded as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(String);

impl Timeframe {
    /// Borrow the timeframe text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self(DEFAULT_TIMEFRAME.to_string())
    }
}

impl From<&str> for Timeframe {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Timeframe {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Subscription Intents
// =============================================================================

/// What the caller currently wants for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionIntent {
    /// Subscribed symbol.
    pub symbol: Symbol,
    /// Latest requested timeframe.
    pub timeframe: Timeframe,
}

impl SubscriptionIntent {
    /// Command that re-establishes this intent on a fresh connection.
    #[must_use]
    pub fn to_subscribe_command(&self) -> Command {
        Command::subscribe(self.symbol.clone(), self.timeframe.clone())
    }
}

/// Desired subscriptions keyed by symbol, in insertion order.
///
/// Updating an existing symbol keeps its position; removing and re-adding
/// moves it to the end. Replay order is therefore deterministic.
#[derive(Debug, Clone, Default)]
pub struct IntentRegistry {
    intents: Vec<SubscriptionIntent>,
}

impl IntentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            intents: Vec::new(),
        }
    }

    /// Record or overwrite the intent for a symbol.
    ///
    /// Returns `true` if the symbol was not present before.
    pub fn upsert(&mut self, symbol: Symbol, timeframe: Timeframe) -> bool {
        if let Some(existing) = self.intents.iter_mut().find(|i| i.symbol == symbol) {
            existing.timeframe = timeframe;
            return false;
        }

        self.intents.push(SubscriptionIntent { symbol, timeframe });
        true
    }

    /// Remove the intent for a symbol.
    pub fn remove(&mut self, symbol: &Symbol) -> Option<SubscriptionIntent> {
        let index = self.intents.iter().position(|i| &i.symbol == symbol)?;
        Some(self.intents.remove(index))
    }

    /// Look up the intent for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<&SubscriptionIntent> {
        self.intents.iter().find(|i| &i.symbol == symbol)
    }

    /// Whether an intent exists for a symbol.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.get(symbol).is_some()
    }

    /// Iterate intents in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionIntent> {
        self.intents.iter()
    }

    /// Commands that restore every intent, in insertion order.
    #[must_use]
    pub fn to_subscribe_commands(&self) -> Vec<Command> {
        self.intents
            .iter()
            .map(SubscriptionIntent::to_subscribe_command)
            .collect()
    }

    /// Number of intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

// =============================================================================
// Consumers
// =============================================================================

/// Caller-supplied callback for one kind of inbound data.
pub type Handler<T> = Box<dyn FnMut(T) + Send + 'static>;

/// Handlers registered for a symbol.
///
/// Either handler may be absent; data for a missing handler is dropped.
///
/// # Example
///
/// ```rust
/// use stock_stream_client::SymbolConsumer;
///
/// let consumer = SymbolConsumer::new()
///     .on_chart(|chart| println!("snapshot: {}", chart.as_value()))
///     .on_tick(|tick| println!("{} ticked", tick.symbol()));
/// assert!(consumer.has_chart_handler());
/// ```
#[derive(Default)]
pub struct SymbolConsumer {
    on_chart: Option<Handler<ChartSnapshot>>,
    on_tick: Option<Handler<Tick>>,
}

impl SymbolConsumer {
    /// Create a consumer with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chart snapshot handler.
    #[must_use]
    pub fn on_chart(mut self, handler: impl FnMut(ChartSnapshot) + Send + 'static) -> Self {
        self.on_chart = Some(Box::new(handler));
        self
    }

    /// Set the tick handler.
    #[must_use]
    pub fn on_tick(mut self, handler: impl FnMut(Tick) + Send + 'static) -> Self {
        self.on_tick = Some(Box::new(handler));
        self
    }

    /// Whether a chart handler is registered.
    #[must_use]
    pub const fn has_chart_handler(&self) -> bool {
        self.on_chart.is_some()
    }

    /// Whether a tick handler is registered.
    #[must_use]
    pub const fn has_tick_handler(&self) -> bool {
        self.on_tick.is_some()
    }

    /// Invoke the chart handler. Returns `false` if there is none.
    pub fn deliver_chart(&mut self, snapshot: ChartSnapshot) -> bool {
        self.on_chart.as_mut().is_some_and(|handler| {
            handler(snapshot);
            true
        })
    }

    /// Invoke the tick handler. Returns `false` if there is none.
    pub fn deliver_tick(&mut self, tick: Tick) -> bool {
        self.on_tick.as_mut().is_some_and(|handler| {
            handler(tick);
            true
        })
    }
}

impl fmt::Debug for SymbolConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolConsumer")
            .field("on_chart", &self.has_chart_handler())
            .field("on_tick", &self.has_tick_handler())
            .finish()
    }
}

/// Registered consumers keyed by symbol.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    consumers: HashMap<Symbol, SymbolConsumer>,
}

impl ConsumerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer, returning the one it replaced.
    pub fn register(&mut self, symbol: Symbol, consumer: SymbolConsumer) -> Option<SymbolConsumer> {
        self.consumers.insert(symbol, consumer)
    }

    /// Remove the consumer for a symbol.
    pub fn remove(&mut self, symbol: &Symbol) -> Option<SymbolConsumer> {
        self.consumers.remove(symbol)
    }

    /// Mutable access to the consumer for a symbol.
    pub fn get_mut(&mut self, symbol: &Symbol) -> Option<&mut SymbolConsumer> {
        self.consumers.get_mut(symbol)
    }

    /// Whether a consumer is registered for a symbol.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.consumers.contains_key(symbol)
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether no consumer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
