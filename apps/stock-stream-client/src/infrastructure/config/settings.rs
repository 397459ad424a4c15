//! Client Configuration Settings
//!
//! Configuration types for the stream client, loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::domain::subscription::Timeframe;

/// Default page origin the endpoint derives from.
pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Default endpoint path.
pub const DEFAULT_PATH: &str = "/ws/stocks";

/// Endpoint settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint derived from the origin.
    pub endpoint: Url,
    /// Timeframe used when a subscription does not name one.
    pub default_timeframe: Timeframe,
    /// Capacity of the bounded event queues.
    pub event_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_timeframe: Timeframe::default(),
            event_capacity: 1024,
        }
    }
}

impl StreamSettings {
    /// Settings for `origin` with every other field defaulted.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is not a usable URL.
    pub fn for_origin(origin: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: derive_endpoint(origin, DEFAULT_PATH)?,
            ..Self::default()
        })
    }
}

/// Reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Delay before a redial.
    pub delay_initial: Duration,
    /// Maximum delay when backoff is enabled.
    pub delay_max: Duration,
    /// Delay multiplier (1.0 = fixed delay).
    pub delay_multiplier: f64,
    /// Jitter as a fraction of the delay (0.0 = none).
    pub jitter_factor: f64,
    /// Maximum consecutive redials (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(3000),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Endpoint settings.
    pub stream: StreamSettings,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is invalid or the default timeframe
    /// is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origin = lookup("STREAM_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let path = lookup("STREAM_PATH").unwrap_or_else(|| DEFAULT_PATH.to_string());
        let endpoint = derive_endpoint(&origin, &path)?;

        let default_timeframe = match lookup("STREAM_DEFAULT_TIMEFRAME") {
            Some(tf) if tf.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(
                    "STREAM_DEFAULT_TIMEFRAME".to_string(),
                ));
            }
            Some(tf) => Timeframe::from(tf.trim()),
            None => Timeframe::default(),
        };

        let stream = StreamSettings {
            endpoint,
            default_timeframe,
            event_capacity: parse_or(
                &lookup,
                "STREAM_EVENT_CAPACITY",
                StreamSettings::default().event_capacity,
            )
            .max(1),
        };

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            delay_initial: parse_millis_or(
                &lookup,
                "STREAM_RECONNECT_DELAY_MS",
                defaults.delay_initial,
            ),
            delay_max: parse_millis_or(
                &lookup,
                "STREAM_RECONNECT_DELAY_MAX_MS",
                defaults.delay_max,
            ),
            delay_multiplier: parse_factor_or(
                &lookup,
                "STREAM_RECONNECT_MULTIPLIER",
                defaults.delay_multiplier,
            ),
            jitter_factor: parse_factor_or(
                &lookup,
                "STREAM_RECONNECT_JITTER",
                defaults.jitter_factor,
            ),
            max_attempts: parse_or(
                &lookup,
                "STREAM_MAX_RECONNECT_ATTEMPTS",
                defaults.max_attempts,
            ),
        };
        let reconnect = ReconnectSettings {
            delay_max: reconnect.delay_max.max(reconnect.delay_initial),
            ..reconnect
        };

        Ok(Self {
            stream,
            reconnect,
            metrics_port: parse_or(&lookup, "STREAM_METRICS_PORT", 0),
        })
    }

    /// The WebSocket endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.stream.endpoint
    }
}

/// Derive the WebSocket endpoint from a page origin.
///
/// `http` maps to `ws` and `https` to `wss`; `ws`/`wss` origins are kept.
/// Any path, query or fragment on the origin is replaced by `path`.
///
/// # Errors
///
/// Returns an error if the origin does not parse, has no host, or uses
/// another scheme.
pub fn derive_endpoint(origin: &str, path: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(origin.trim()).map_err(|e| ConfigError::InvalidOrigin {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidOrigin {
            origin: origin.to_string(),
            reason: "missing host".to_string(),
        });
    }

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };

    url.set_scheme(scheme)
        .map_err(|()| ConfigError::UnsupportedScheme(scheme.to_string()))?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

#[allow(clippy::expect_used)]
fn default_endpoint() -> Url {
    derive_endpoint(DEFAULT_ORIGIN, DEFAULT_PATH).expect("default origin is a valid URL")
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The origin could not be turned into an endpoint.
    #[error("invalid stream origin {origin:?}: {reason}")]
    InvalidOrigin {
        /// Origin as configured.
        origin: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The origin scheme cannot be mapped to a WebSocket scheme.
    #[error("unsupported origin scheme: {0}")]
    UnsupportedScheme(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a non-negative finite factor, falling back to `default` otherwise.
fn parse_factor_or<F>(lookup: &F, key: &str, default: f64) -> f64
where
    F: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_or(lookup, key, default);
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        default
    }
}

fn parse_millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
