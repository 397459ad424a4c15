//! Prometheus Metrics Module
//!
//! Records channel activity through the `metrics` facade. Without an
//! installed recorder every call is a no-op, so the channel can record
//! unconditionally.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames received, envelopes dispatched, messages discarded
//! - **Commands**: commands sent and dropped by type
//! - **Connection**: connected gauge and scheduled reconnects
//! - **Latency**: dispatch time per envelope

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

// =============================================================================
// Initialization
// =============================================================================

/// Errors raised while installing the Prometheus exporter.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built or the recorder installed.
    #[error("failed to install Prometheus exporter: {0}")]
    Installation(String),
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or a recorder is
/// already installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    register_metrics();

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "stock_stream_frames_received_total",
        "Total inbound frames received from the stream"
    );
    describe_counter!(
        "stock_stream_envelopes_dispatched_total",
        "Total envelopes delivered to a consumer handler"
    );
    describe_counter!(
        "stock_stream_messages_discarded_total",
        "Total inbound messages discarded by reason"
    );
    describe_counter!(
        "stock_stream_commands_sent_total",
        "Total commands written to the connection"
    );
    describe_counter!(
        "stock_stream_commands_dropped_total",
        "Total commands dropped because the connection was not usable"
    );
    describe_counter!(
        "stock_stream_reconnects_total",
        "Total reconnect attempts scheduled"
    );
    describe_gauge!(
        "stock_stream_connected",
        "1 while the stream connection is open"
    );
    describe_histogram!(
        "stock_stream_dispatch_seconds",
        "Time spent decoding and dispatching one inbound frame"
    );
}

// =============================================================================
// Labels
// =============================================================================

/// Why an inbound message was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The frame failed to decode as an envelope.
    Malformed,
    /// No consumer is registered for the symbol.
    NoConsumer,
    /// A consumer exists but has no handler for this envelope kind.
    NoHandler,
    /// The envelope type is not known to this client.
    UnknownType,
}

impl DiscardReason {
    /// Label value for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::NoConsumer => "no_consumer",
            Self::NoHandler => "no_handler",
            Self::UnknownType => "unknown_type",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an inbound frame.
pub fn record_frame_received() {
    counter!("stock_stream_frames_received_total").increment(1);
}

/// Record an envelope delivered to a handler.
pub fn record_envelope_dispatched(kind: &'static str) {
    counter!(
        "stock_stream_envelopes_dispatched_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a discarded inbound message.
pub fn record_message_discarded(reason: DiscardReason) {
    counter!(
        "stock_stream_messages_discarded_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a command written to the connection.
pub fn record_command_sent(kind: &'static str) {
    counter!(
        "stock_stream_commands_sent_total",
        "command" => kind
    )
    .increment(1);
}

/// Record a command dropped before reaching the connection.
pub fn record_command_dropped(kind: &'static str) {
    counter!(
        "stock_stream_commands_dropped_total",
        "command" => kind
    )
    .increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect_scheduled() {
    counter!("stock_stream_reconnects_total").increment(1);
}

/// Update the connected gauge.
pub fn set_connected(connected: bool) {
    gauge!("stock_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record how long one frame took to decode and dispatch.
pub fn record_dispatch_duration(duration: Duration) {
    histogram!("stock_stream_dispatch_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_reason_as_str() {
        assert_eq!(DiscardReason::Malformed.as_str(), "malformed");
        assert_eq!(DiscardReason::NoConsumer.as_str(), "no_consumer");
        assert_eq!(DiscardReason::NoHandler.as_str(), "no_handler");
        assert_eq!(DiscardReason::UnknownType.as_str(), "unknown_type");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_envelope_dispatched("tick");
        record_message_discarded(DiscardReason::NoConsumer);
        record_command_sent("subscribe");
        record_command_dropped("requestChart");
        record_reconnect_scheduled();
        set_connected(true);
        record_dispatch_duration(Duration::from_micros(5));
    }
}
