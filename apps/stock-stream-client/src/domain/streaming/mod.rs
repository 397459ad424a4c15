//! Market Data Streaming Types
//!
//! Wire-level vocabulary of the stock stream: the commands the client sends
//! and the envelopes the server pushes back. Payloads are kept as opaque
//! JSON; the client only reads the discriminant and the routing symbol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::subscription::{Symbol, Timeframe};

// =============================================================================
// Outbound Commands
// =============================================================================

/// A command sent to the server.
///
/// Commands are fire-and-forget: there is no correlation id and no
/// acknowledgement. Confirmation is implicit in the envelopes that follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Start streaming a symbol; the server answers with a chart snapshot
    /// followed by live ticks.
    Subscribe {
        /// Symbol to subscribe.
        symbol: Symbol,
        /// Chart timeframe for the initial snapshot.
        timeframe: Timeframe,
    },
    /// Stop streaming a symbol.
    Unsubscribe {
        /// Symbol to unsubscribe.
        symbol: Symbol,
    },
    /// Re-request the chart snapshot for a symbol at another timeframe.
    RequestChart {
        /// Symbol whose chart is requested.
        symbol: Symbol,
        /// Requested timeframe.
        timeframe: Timeframe,
    },
}

impl Command {
    /// Create a subscribe command.
    #[must_use]
    pub const fn subscribe(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self::Subscribe { symbol, timeframe }
    }

    /// Create an unsubscribe command.
    #[must_use]
    pub const fn unsubscribe(symbol: Symbol) -> Self {
        Self::Unsubscribe { symbol }
    }

    /// Create a chart request command.
    #[must_use]
    pub const fn request_chart(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self::RequestChart { symbol, timeframe }
    }

    /// Wire name of the command.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::RequestChart { .. } => "requestChart",
        }
    }

    /// Symbol the command refers to.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        match self {
            Self::Subscribe { symbol, .. }
            | Self::Unsubscribe { symbol }
            | Self::RequestChart { symbol, .. } => symbol,
        }
    }
}

// =============================================================================
// Inbound Payloads
// =============================================================================

/// Opaque chart snapshot pushed by the server for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSnapshot(Value);

impl ChartSnapshot {
    /// Wrap a raw payload.
    #[must_use]
    pub const fn new(data: Value) -> Self {
        Self(data)
    }

    /// Borrow the raw payload.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the raw payload.
    #[must_use]
    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// A live tick.
///
/// The payload is passed through verbatim, including the `symbol` field the
/// tick was routed by.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    symbol: Symbol,
    payload: Value,
}

impl Tick {
    /// Build a tick from its payload, reading the routing symbol from it.
    ///
    /// Returns `None` if the payload has no string `symbol` field.
    #[must_use]
    pub fn from_payload(payload: Value) -> Option<Self> {
        let symbol = payload.get("symbol")?.as_str()?;
        Some(Self {
            symbol: Symbol::from(symbol),
            payload,
        })
    }

    /// Symbol this tick belongs to.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Borrow the raw payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Take the raw payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }
}

// =============================================================================
// Inbound Envelope
// =============================================================================

/// A decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    /// Chart snapshot, routed by the envelope-level symbol.
    Chart {
        /// Symbol the snapshot belongs to.
        symbol: Symbol,
        /// Snapshot payload.
        snapshot: ChartSnapshot,
    },
    /// Live tick, routed by the symbol inside its payload.
    Tick(Tick),
    /// A message type this client does not know; ignored.
    Unknown(String),
}

impl InboundEnvelope {
    /// Symbol used to find the consumer, if the envelope is routable.
    #[must_use]
    pub const fn routing_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Chart { symbol, .. } => Some(symbol),
            Self::Tick(tick) => Some(tick.symbol()),
            Self::Unknown(_) => None,
        }
    }

    /// Wire discriminant of the envelope.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Chart { .. } => "chart",
            Self::Tick(_) => "tick",
            Self::Unknown(kind) => kind,
        }
    }
}
