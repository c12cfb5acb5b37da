use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocabError {
    #[error("vocab type not found: {0}")]
    NotFound(String),

    #[error("vocab registry is empty, cannot resolve nearest type")]
    EmptyRegistry,

    #[error("store error: {0}")]
    Store(#[from] gnosis_store::StoreError),

    #[error("provider error: {0}")]
    Provider(#[from] gnosis_providers::ProviderError),
}

pub type VocabResult<T> = Result<T, VocabError>;
