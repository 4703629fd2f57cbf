//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Startup
//! failures carry the service they belong to so the caller can decide whether
//! to retry or abort.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the onebox host.
#[derive(Error, Debug)]
pub enum Error {
    /// A transport could not acquire its address.
    #[error("{service}: failed to bind {address}: {source}")]
    Bind {
        service: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A handler constructor rejected its runtime context.
    #[error("{service}: handler construction failed: {reason}")]
    Construction { service: String, reason: String },

    /// A constructed handler failed to start serving.
    #[error("{service}: handler start failed: {reason}")]
    HandlerStart { service: String, reason: String },

    /// A lifecycle phase was aborted because one of its participants failed.
    #[error("{phase} aborted: {reason}")]
    Startup { phase: String, reason: String },

    /// Invalid runtime state transition (maps to FAILED_PRECONDITION).
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Validation errors (maps to INVALID_ARGUMENT).
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown service or method (maps to NOT_FOUND).
    #[error("not found: {0}")]
    NotFound(String),

    /// Error frame returned by a remote peer.
    #[error("remote error [{code}]: {message}")]
    Remote { code: String, message: String },

    /// Timeout (maps to DEADLINE_EXCEEDED).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors (maps to INTERNAL).
    #[error("internal error: {0}")]
    Internal(String),

    /// Msgpack encoding/decoding errors.
    #[error("codec error: {0}")]
    Codec(String),

    /// JSON serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable error code written into wire error frames.
    pub fn to_wire_code(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::Codec(_) | Error::Serialization(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::StateTransition(_) => "FAILED_PRECONDITION",
            Error::Bind { .. } | Error::Io(_) => "UNAVAILABLE",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Construction { .. }
            | Error::HandlerStart { .. }
            | Error::Startup { .. }
            | Error::Internal(_) => "INTERNAL",
            Error::Remote { .. } => "UNAVAILABLE",
        }
    }

    /// Whether this error happened while bringing a service up.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Error::Bind { .. }
                | Error::Construction { .. }
                | Error::HandlerStart { .. }
                | Error::Startup { .. }
        )
    }
}

// Convenience constructors
impl Error {
    pub fn bind(
        service: impl Into<String>,
        address: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Bind {
            service: service.into(),
            address: address.into(),
            source,
        }
    }

    pub fn construction(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Construction {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn handler_start(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HandlerStart {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn startup(phase: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Startup {
            phase: phase.into(),
            reason: reason.into(),
        }
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
