//! WebSocket Adapters
//!
//! Concrete ports for the subscription channel plus the runtime handle
//! that drives it:
//!
//! - [`codec`]: JSON commands out, envelopes in
//! - [`transport`]: `tokio-tungstenite` connection tasks
//! - [`timer`]: `tokio::time` reconnect timer
//! - [`client`]: [`StreamClient`] and its dispatch loop

pub mod client;
pub mod codec;
pub mod timer;
pub mod transport;

pub use client::{ClientCommand, StreamClient};
pub use codec::{CodecError, JsonCodec};
pub use timer::TokioReconnectTimer;
pub use transport::WebSocketTransport;
