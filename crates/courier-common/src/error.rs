//! Error types for decoding Courier payloads.

use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload mismatch: expected {expected}, got {actual}")]
    PayloadMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}
