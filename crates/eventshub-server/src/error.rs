//! Server error types.

use std::io;

use eventshub_core::CodecError;
use thiserror::Error;

use crate::repository::StorageError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration. All are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required configuration: {var}")]
    Missing { var: String },

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

impl ConfigError {
    pub fn missing(var: impl Into<String>) -> Self {
        Self::Missing { var: var.into() }
    }

    pub fn invalid(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Time zone error: {0}")]
    Codec(#[from] CodecError),

    /// The configured address did not resolve or could not be bound.
    #[error("Cannot bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// Certificate or key could not be loaded.
    #[error("TLS error: {message}")]
    Tls { message: String },

    /// A lifecycle method was called in the wrong state.
    #[error("Invalid lifecycle transition: cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

impl ServerError {
    pub fn bind(addr: impl Into<String>, reason: impl ToString) -> Self {
        Self::Bind {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }
}
