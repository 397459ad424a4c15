//! Stream Codec Module
//!
//! JSON encoding of outbound commands and decoding of inbound envelopes.
//!
//! Only the `type` discriminant and the routing symbol are validated;
//! payloads are passed through untouched.
//!
//! ```json
//! {"type":"chart","symbol":"005930","data":{...}}
//! {"type":"tick","data":{"symbol":"005930","price":71200,...}}
//! ```

use serde_json::Value;

use crate::domain::streaming::{ChartSnapshot, Command, InboundEnvelope, Tick};
use crate::domain::subscription::Symbol;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field required for routing is missing or not a string.
    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the stock stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into an envelope.
    ///
    /// Unknown `type` values decode to [`InboundEnvelope::Unknown`] rather
    /// than failing.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, has no string
    /// `type`, or lacks the routing symbol for its type.
    pub fn decode(&self, text: &str) -> Result<InboundEnvelope, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;

        let Value::Object(mut object) = value else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                truncate(text.trim(), 50)
            )));
        };

        let msg_type = match object.remove("type") {
            Some(Value::String(t)) => t,
            _ => return Err(CodecError::MissingField("type")),
        };

        match msg_type.as_str() {
            "chart" => {
                let symbol = match object.remove("symbol") {
                    Some(Value::String(s)) => Symbol::from(s),
                    _ => return Err(CodecError::MissingField("symbol")),
                };
                let data = object.remove("data").unwrap_or(Value::Null);

                Ok(InboundEnvelope::Chart {
                    symbol,
                    snapshot: ChartSnapshot::new(data),
                })
            }
            "tick" => {
                let data = object.remove("data").unwrap_or(Value::Null);
                let tick = Tick::from_payload(data).ok_or(CodecError::MissingField("data.symbol"))?;

                Ok(InboundEnvelope::Tick(tick))
            }
            _ => Ok(InboundEnvelope::Unknown(msg_type)),
        }
    }

    /// Encode a command to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, command: &Command) -> Result<String, CodecError> {
        Ok(serde_json::to_string(command)?)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}
