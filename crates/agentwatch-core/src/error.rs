//! Error types for AgentWatch

use thiserror::Error;

/// Result type alias using AgentWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for AgentWatch operations
///
/// Unknown request, trace or alert ids are never errors: those lookups
/// return `None` or `false` because late events racing a completion are
/// expected on the request path.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error (unknown alert type, severity, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// An alert handler reported a failure
    #[error("Alert handler '{handler}' failed: {message}")]
    Handler {
        /// Handler name
        handler: String,
        /// Failure reported by the handler
        message: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a handler error
    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
