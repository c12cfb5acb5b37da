//! Error taxonomy: one `thiserror` enum per failure kind, with a
//! `retryable()`/`is_fatal()` classification the caller uses to decide
//! retry-with-backoff vs. skip-and-continue vs. fail-the-job.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] gnosis_store::StoreError),

    #[error(transparent)]
    Provider(#[from] gnosis_providers::ProviderError),

    #[error(transparent)]
    Vocab(#[from] gnosis_vocab::VocabError),

    #[error(transparent)]
    Ingest(#[from] gnosis_ingest::IngestError),

    #[error("job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("invalid job state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: gnosis_store::JobState, to: gnosis_store::JobState },

    #[error("job cancelled")]
    Cancelled,

    #[error("provider auth failure: {0}")]
    AuthFailure(String),

    #[error("document unavailable: {0}")]
    DocumentUnavailable(String),
}

impl PipelineError {
    /// Per the error table: transient store/provider errors retry with
    /// backoff; everything else (auth failure, constraint violation,
    /// invalid transition) does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Store(e) => e.is_retryable(),
            PipelineError::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Job-level errors (auth failure, store unavailable after retry
    /// exhaustion) are terminal; everything else is meant to be localized
    /// to a single chunk or concept and should not fail the whole job.
    pub fn is_job_fatal(&self) -> bool {
        matches!(self, PipelineError::AuthFailure(_) | PipelineError::Cancelled | PipelineError::DocumentUnavailable(_))
            || matches!(self, PipelineError::Provider(e) if e.is_auth_failure())
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            PipelineError::Store(_) => "store_unavailable",
            PipelineError::Provider(e) if e.is_auth_failure() => "auth_failure",
            PipelineError::Provider(_) => "provider_error",
            PipelineError::Vocab(_) => "vocabulary_error",
            PipelineError::Ingest(_) => "ingest_error",
            PipelineError::JobNotFound(_) => "job_not_found",
            PipelineError::InvalidTransition { .. } => "invalid_transition",
            PipelineError::Cancelled => "cancelled",
            PipelineError::AuthFailure(_) => "auth_failure",
            PipelineError::DocumentUnavailable(_) => "document_unavailable",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
