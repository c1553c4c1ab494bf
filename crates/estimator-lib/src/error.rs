//! Error taxonomy for the estimation and feedback pipeline

use thiserror::Error;

/// Errors produced by the estimator library
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// Malformed or out-of-domain feature input; rejected, never retried
    #[error("invalid input: {0}")]
    Validation(String),

    /// A training column has no usable values
    #[error("feature column '{column}' has no non-missing values")]
    DegenerateColumn { column: &'static str },

    /// Filtering removed every training row
    #[error("no training rows left after filtering ({0})")]
    InsufficientData(String),

    /// Network or timeout failure talking to the registry or object store
    #[error("storage temporarily unavailable: {0}")]
    StorageTransient(String),

    /// Feature layout of a model does not match the schema
    #[error("feature schema mismatch: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// Permanent storage failure, e.g. rejected credentials
    #[error("storage error: {0}")]
    Storage(String),

    /// A conditional write lost the race against a concurrent writer
    #[error("concurrent modification of {0}")]
    Conflict(String),

    /// Artifact failed checksum or parse validation
    #[error("corrupt model artifact: {0}")]
    ArtifactCorrupt(String),

    /// The requested transition is not allowed in the current session state
    #[error("invalid session transition: {0}")]
    InvalidTransition(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EstimatorError {
    /// Transient errors may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, EstimatorError::StorageTransient(_))
    }

    /// Failures on the store side; feedback is staged locally instead of lost
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            EstimatorError::StorageTransient(_)
                | EstimatorError::Conflict(_)
                | EstimatorError::Storage(_)
                | EstimatorError::Io(_)
        )
    }
}

impl From<reqwest::Error> for EstimatorError {
    fn from(err: reqwest::Error) -> Self {
        EstimatorError::StorageTransient(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EstimatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(EstimatorError::StorageTransient("timeout".into()).is_retryable());
        assert!(!EstimatorError::Validation("bad".into()).is_retryable());
        assert!(!EstimatorError::Conflict("feedback/feedback.csv".into()).is_retryable());
        assert!(!EstimatorError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_conflict_counts_as_storage_failure() {
        assert!(EstimatorError::Conflict("k".into()).is_storage_failure());
        assert!(!EstimatorError::InsufficientData("empty".into()).is_storage_failure());
        assert!(!EstimatorError::Validation("bad".into()).is_storage_failure());
    }

    #[test]
    fn test_io_error_counts_as_storage_failure() {
        let err = EstimatorError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only bucket",
        ));
        assert!(err.is_storage_failure());
        assert!(!err.is_retryable());
    }
}
