//! Configuration Module
//!
//! Environment-driven configuration for the stream client.

mod settings;

pub use settings::{
    ClientConfig, ConfigError, DEFAULT_ORIGIN, DEFAULT_PATH, ReconnectSettings, StreamSettings,
    derive_endpoint,
};
