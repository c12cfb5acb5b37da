//! Store error taxonomy, per the error-handling design: transient errors are
//! retryable by the caller, `DimensionMismatch` must never be swallowed into
//! a silently-wrong result, and constraint violations abort the current
//! transaction without taking down the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(
        "dimension mismatch: query vector has dimension {got}, active config expects {expected}"
    )]
    DimensionMismatch { expected: usize, got: usize },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

impl StoreError {
    /// Whether a caller should retry this error with backoff (transient
    /// store errors), per the error table's "retry with jittered backoff"
    /// policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
