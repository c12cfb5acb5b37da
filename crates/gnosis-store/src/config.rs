//! Store configuration: on-disk snapshot location and the similarity
//! threshold used by `UpsertEngine` concept matching. Plain `serde`
//! `Default`-impl struct, following the teacher's `StorageConfig` shape
//! rather than a bespoke config DSL.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the bincode snapshot file. `None` means in-memory only (tests).
    pub snapshot_path: Option<PathBuf>,
    /// Concept-match threshold used by `UpsertEngine` (spec default 0.85).
    /// Stored here, not per-ontology, per the open-question resolution that
    /// similarity tuning is applied globally.
    pub concept_match_threshold: f32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            concept_match_threshold: 0.85,
        }
    }
}
