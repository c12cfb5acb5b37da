use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid chunker config: {0}")]
    InvalidConfig(String),

    #[error("empty document")]
    EmptyDocument,
}

pub type IngestResult<T> = Result<T, IngestError>;
