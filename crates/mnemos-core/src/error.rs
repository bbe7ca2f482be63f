//! Error types for the memory subsystem.

use mnemos_backend::BackendError;

/// Errors produced by memory operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// None of the datasets visible to the scope has a backend id yet.
    #[error("no dataset indexed yet for: {}", .datasets.join(", "))]
    NoDatasetIndexed { datasets: Vec<String> },

    #[error("entry not found: {id}")]
    EntryNotFound { id: String },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_dataset_message_lists_names() {
        let err = MemoryError::NoDatasetIndexed {
            datasets: vec!["alice-private".into(), "alice-profile".into()],
        };
        assert_eq!(
            err.to_string(),
            "no dataset indexed yet for: alice-private, alice-profile"
        );
    }

    #[test]
    fn test_backend_error_converts() {
        let err: MemoryError = BackendError::Http {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, MemoryError::Backend(_)));
    }
}
