//! Application Services
//!
//! - `SubscriptionChannel`: connection lifecycle, command sending,
//!   subscription registry and inbound dispatch
//! - `ReconnectPolicy`: delay before each redial

pub mod channel;
pub mod reconnect;

pub use channel::SubscriptionChannel;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
