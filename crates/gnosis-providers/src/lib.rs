//! Pluggable AI-provider abstraction: embeddings and structured extraction,
//! both behind an atomically hot-reloadable indirection.

pub mod embedding;
pub mod error;
pub mod extraction;

pub use embedding::{EmbeddingProvider, EmbeddingProviderConfig, EmbeddingRole, MockEmbeddingProvider};
#[cfg(feature = "openai")]
pub use embedding::HttpEmbeddingProvider;
pub use error::{ProviderError, ProviderResult};
pub use extraction::{
    ConceptCandidate, ContextConcept, ExtractionProvider, ExtractionResult, ExtractionSchema,
    InstanceCandidate, RelationshipCandidate, ScriptedExtractionProvider,
};
#[cfg(feature = "anthropic")]
pub use extraction::HttpExtractionProvider;
