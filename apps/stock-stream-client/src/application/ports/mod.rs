//! Port Interfaces
//!
//! Contracts between the subscription channel and the outside world,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`]: opens, writes to and closes the duplex connection
//! - [`ReconnectTimer`]: schedules and cancels the deferred redial
//!
//! ## Driver Events (Inbound)
//!
//! - [`ConnectionEvent`]: lifecycle and data events produced by a transport
//!
//! All port methods are non-blocking. Results of an `open` arrive later as
//! [`ConnectionEvent`]s tagged with the [`ConnectionId`] passed to it.

use std::time::Duration;

use url::Url;

use crate::domain::connection::{ConnectionId, TimerToken};

// =============================================================================
// Transport
// =============================================================================

/// Errors returned by [`Transport::send`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No writer exists for the given connection.
    #[error("connection {0} is not open")]
    NotConnected(ConnectionId),

    /// The outbound queue is full; the frame was dropped.
    #[error("outbound queue full for connection {0}")]
    QueueFull(ConnectionId),

    /// The connection's writer has already shut down.
    #[error("connection {0} writer closed")]
    WriterClosed(ConnectionId),
}

/// Duplex connection to the stream endpoint.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Start connecting. Completion is reported as
    /// [`ConnectionEvent::Opened`] or [`ConnectionEvent::Closed`].
    fn open(&mut self, id: ConnectionId, url: &Url);

    /// Queue a text frame on the given connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has no usable writer.
    fn send(&mut self, id: ConnectionId, frame: String) -> Result<(), TransportError>;

    /// Start closing the given connection. A [`ConnectionEvent::Closed`]
    /// follows once the socket is gone.
    fn close(&mut self, id: ConnectionId);
}

// =============================================================================
// Reconnect Timer
// =============================================================================

/// Deferred redial scheduling.
///
/// A firing is reported back to the channel with the token it was
/// scheduled under.
#[cfg_attr(test, mockall::automock)]
pub trait ReconnectTimer {
    /// Fire `token` after `delay`.
    fn schedule(&mut self, token: TimerToken, delay: Duration);

    /// Cancel a scheduled token. Unknown tokens are ignored.
    fn cancel(&mut self, token: TimerToken);
}

// =============================================================================
// Connection Events
// =============================================================================

/// Event produced by a transport for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection is established.
    Opened {
        /// Connection the event belongs to.
        id: ConnectionId,
    },
    /// A text frame arrived.
    Frame {
        /// Connection the event belongs to.
        id: ConnectionId,
        /// Raw frame text.
        text: String,
    },
    /// A transport-level error occurred. A `Closed` event follows.
    Errored {
        /// Connection the event belongs to.
        id: ConnectionId,
        /// Error description.
        error: String,
    },
    /// The connection is gone (clean close, failed dial or error).
    Closed {
        /// Connection the event belongs to.
        id: ConnectionId,
    },
}

impl ConnectionEvent {
    /// Connection the event belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        match self {
            Self::Opened { id }
            | Self::Frame { id, .. }
            | Self::Errored { id, .. }
            | Self::Closed { id } => *id,
        }
    }

    /// Short event name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "opened",
            Self::Frame { .. } => "frame",
            Self::Errored { .. } => "errored",
            Self::Closed { .. } => "closed",
        }
    }
}
