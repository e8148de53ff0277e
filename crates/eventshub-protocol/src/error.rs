//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while reading or writing request bodies.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request carried no body where one is required.
    #[error("missing body")]
    EmptyBody,

    /// The body is not valid JSON for the expected envelope.
    #[error("malformed body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}
