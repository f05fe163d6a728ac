//! Error types for the Courier client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unauthorized (status {0})")]
    Unauthorized(u16),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] courier_common::ProtocolError),
}

impl ClientError {
    /// Failures that retrying cannot fix without user action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_) | ClientError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(ClientError::Unauthorized(401).is_terminal());
        assert!(ClientError::Unauthenticated.is_terminal());
        assert!(!ClientError::Status {
            status: 502,
            message: "bad gateway".into()
        }
        .is_terminal());
    }
}
