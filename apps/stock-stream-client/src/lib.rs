#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Stock Stream Client - Market Data Subscription Channel
//!
//! Keeps one WebSocket connection to the dashboard backend, multiplexes
//! per-symbol chart and tick subscriptions over it, and replays every
//! current subscription after a reconnect so consumers never re-issue
//! commands themselves.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `connection`: connection state, connection ids, timer tokens
//!   - `streaming`: outbound commands and inbound envelopes
//!   - `subscription`: symbols, intents and per-symbol consumers
//!
//! - **Application**: Ports and the channel state machine
//!   - `ports`: transport and reconnect timer interfaces
//!   - `services`: subscription channel and reconnect policy
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: codec, `tokio-tungstenite` transport, timer, client runtime
//!   - `config`: environment configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: tracing subscriber
//!
//! # Data Flow
//!
//! ```text
//!  subscribe / unsubscribe / request_chart
//!                 │
//!                 ▼
//!  StreamClient ──► dispatch loop ──► SubscriptionChannel ──► ws://host/ws/stocks
//!                                         │     ▲
//!                  on_chart / on_tick ◄───┘     └── chart / tick envelopes
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stock_stream_client::{ClientConfig, StreamClient, SymbolConsumer};
//!
//! # async fn run() -> Result<(), stock_stream_client::ConfigError> {
//! let config = ClientConfig::from_env()?;
//! let (client, _task) = StreamClient::spawn(&config);
//!
//! client.subscribe(
//!     "005930",
//!     SymbolConsumer::new().on_tick(|tick| println!("{}", tick.payload())),
//! );
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Ports and the channel state machine.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionId, ConnectionState, TimerToken};
pub use domain::streaming::{ChartSnapshot, Command, InboundEnvelope, Tick};
pub use domain::subscription::{
    DEFAULT_TIMEFRAME, IntentRegistry, SubscriptionIntent, Symbol, SymbolConsumer, Timeframe,
};

// Application
pub use application::ports::{ConnectionEvent, ReconnectTimer, Transport, TransportError};
pub use application::services::{ReconnectConfig, ReconnectPolicy, SubscriptionChannel};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError, ReconnectSettings, StreamSettings};

// Client runtime
pub use infrastructure::websocket::{
    ClientCommand, CodecError, JsonCodec, StreamClient, TokioReconnectTimer, WebSocketTransport,
};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
