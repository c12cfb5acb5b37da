//! Document chunking: splits a source document into an ordered, finite,
//! restartable sequence of word-bounded chunks with carried overlap.

pub mod chunker;
pub mod error;

pub use chunker::{Chunk, Chunker, ChunkerConfig};
pub use error::{IngestError, IngestResult};
