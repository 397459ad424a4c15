//! Application Layer - Subscription channel and port definitions.
//!
//! This layer contains the subscription channel state machine and the
//! port interfaces it drives.

/// Port interfaces for the transport and reconnect timer.
pub mod ports;

/// Subscription channel and reconnect policy.
pub mod services;
