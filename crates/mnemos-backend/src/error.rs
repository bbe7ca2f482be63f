//! Error types for mnemos-backend

use thiserror::Error;

/// Errors that can occur when talking to the knowledge backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend answered with a non-2xx status
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request did not complete within its deadline
    #[error("backend {operation} timed out")]
    Timeout { operation: String },

    /// Connection-level failure (DNS, TLS, reset, ...)
    #[error("backend transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("failed to decode backend response: {0}")]
    Decode(String),

    /// Client configuration is unusable
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),
}

impl BackendError {
    /// HTTP status code, when the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout { .. })
    }

    pub(crate) fn from_reqwest(operation: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout {
                operation: operation.to_string(),
            }
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;
