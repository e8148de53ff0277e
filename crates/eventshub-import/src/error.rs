//! Importer error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Errors that can occur while importing.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The importer configuration could not be read or parsed.
    #[error("configuration error in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// A required environment variable is unset or empty.
    #[error("missing environment variable: {var}")]
    MissingVariable { var: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file is not a well-formed event export.
    #[error("malformed XML in {path}: {reason}")]
    Xml { path: PathBuf, reason: String },

    /// An event attribute could not be converted.
    #[error("event {uuid}: invalid {field} {value:?}")]
    InvalidField {
        uuid: String,
        field: &'static str,
        value: String,
    },

    /// The CA bundle could not be loaded.
    #[error("invalid CA certificate {path}: {reason}")]
    Certificate { path: PathBuf, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server refused the credentials.
    #[error("login failed with HTTP {status}")]
    Login { status: u16 },

    /// Every attempt was answered with 401.
    #[error("still unauthorized after {attempts} attempts")]
    Unauthorized { attempts: u32 },

    /// The server answered with an error status.
    #[error("server rejected the request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl ImportError {
    pub fn config(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing(var: impl Into<String>) -> Self {
        Self::MissingVariable { var: var.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
