use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider api error: {0}")]
    Api(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider auth failure: {0}")]
    AuthFailure(String),

    #[error("unrecognized model: {0}")]
    UnknownModel(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Transient provider errors are retried a small, fixed number of times
    /// (N=2 for extraction) to bound cost; auth failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Api(_) | ProviderError::RateLimited { .. } | ProviderError::Network(_)
        )
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ProviderError::AuthFailure(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
