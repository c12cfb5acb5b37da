//! `DocumentLoader`: resolves a job's `PayloadRef.source_ref` to the raw
//! document text. The Store only ever holds chunked `Source` rows created
//! during processing, never the original document, so the scheduler needs
//! a small seam to fetch it — kept a trait so a CLI backed by the
//! filesystem and, say, a future object-storage-backed service can share
//! the rest of the pipeline.

use async_trait::async_trait;

use crate::error::{PipelineError, PipelineResult};

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, source_ref: &str) -> PipelineResult<String>;
}

/// Reads `source_ref` as a filesystem path, relative to `root` if given.
pub struct FsDocumentLoader {
    root: Option<std::path::PathBuf>,
}

impl FsDocumentLoader {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }
}

impl Default for FsDocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for FsDocumentLoader {
    async fn load(&self, source_ref: &str) -> PipelineResult<String> {
        let path = match &self.root {
            Some(root) => root.join(source_ref),
            None => std::path::PathBuf::from(source_ref),
        };
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PipelineError::DocumentUnavailable(format!("cannot read {}: {e}", path.display())))
    }
}
