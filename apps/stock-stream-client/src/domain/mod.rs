//! Domain Layer - Core subscription and streaming types.
//!
//! Pure types with no I/O: connection lifecycle states, the wire
//! vocabulary, and the subscription/consumer registries.

/// Connection lifecycle state and identifiers.
pub mod connection;

/// Commands and inbound envelopes.
pub mod streaming;

/// Subscription intents and consumer registration.
pub mod subscription;
