//! Error types for watchplex.
//!
//! All errors are strongly typed using thiserror so callers (and failure
//! policies) can match on the specific condition that ended a stream.

use thiserror::Error;

use crate::kind::{KindId, WatchScope};

/// HTTP-like status the API server uses when the requested history has been compacted.
pub const STATUS_GONE: u16 = 410;

/// Errors raised while building or reconfiguring a watch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unknown resource kind: {kind}")]
    UnknownKind {
        kind: String,
    },

    #[error("{kind} has no {scope} watch support")]
    UnsupportedWatch {
        kind: KindId,
        scope: WatchScope,
    },

    #[error("Resource version cursor cannot be empty")]
    EmptyCursor,
}

/// Failures surfaced by a streaming transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("API error (status {status}): {reason}")]
    Api {
        status: u16,
        reason: String,
    },

    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },
}

impl TransportError {
    /// Creates an API error with the given status and reason.
    #[must_use]
    pub fn api(status: u16, reason: impl Into<String>) -> Self {
        Self::Api {
            status,
            reason: reason.into(),
        }
    }

    /// Status code, if the failure came from the API server.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::ConnectionFailed { .. } => None,
        }
    }

    /// Free-text reason attached to the failure.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Api { reason, .. } => reason,
            Self::ConnectionFailed { message } => message,
        }
    }

    /// Returns true if this is a "history gone" signal.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Api { status: STATUS_GONE, .. })
    }
}

/// Top-level error type for watch sessions and the multiplexer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Resource history expired (status {status}): {reason}")]
    ExpiredCursor {
        status: u16,
        reason: String,
    },

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Failed to decode watch event: {message}")]
    Decode {
        message: String,
    },

    #[error("Unable to determine the oldest available resource version: {reason}")]
    Priming {
        reason: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl From<TransportError> for WatchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Api { status, reason } if status == STATUS_GONE => {
                Self::ExpiredCursor { status, reason }
            }
            other => Self::Transport(other),
        }
    }
}

impl WatchError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if the requested history window was compacted.
    #[must_use]
    pub const fn is_expired_cursor(&self) -> bool {
        matches!(self, Self::ExpiredCursor { .. })
    }

    /// Returns true if this is a non-expiry transport failure.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Status code carried by the failure, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::ExpiredCursor { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// Result type alias for watchplex operations.
pub type WatchResult<T> = Result<T, WatchError>;
