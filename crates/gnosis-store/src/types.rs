//! The data model: `Concept`, `Source`, `Instance`, `Relationship`, `Ontology`
//! (implicit — a string namespace, not a row), `VocabType`, `Job`,
//! `EmbeddingConfig`. Mirrors the teacher's `Entity`/`Relation` shape but
//! typed per-kind rather than as an attribute bag, since every field here has
//! a fixed, known meaning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fixed-dimension embedding, tagged with the model that produced it so a
/// stale vector from a retired `EmbeddingConfig` is never silently compared
/// against a vector from the active one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub model_id: String,
    pub dimension: usize,
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(model_id: impl Into<String>, vector: Vec<f32>) -> Self {
        let dimension = vector.len();
        Self {
            model_id: model_id.into(),
            dimension,
            vector,
        }
    }
}

/// Whether a concept's stored embedding still matches the active
/// `EmbeddingConfig`'s model/dimension, per the data-model invariant that an
/// embedding at the wrong dimension is queryable but not search-usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingStatus {
    Compatible,
    Incompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: String,
    pub label: String,
    pub search_terms: Vec<String>,
    pub embedding: Option<Embedding>,
    pub embedding_status: EmbeddingStatus,
    pub grounding_strength: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    pub fn new(concept_id: String, label: String, now: DateTime<Utc>) -> Self {
        Self {
            concept_id,
            label,
            search_terms: Vec::new(),
            embedding: None,
            embedding_status: EmbeddingStatus::Incompatible,
            grounding_strength: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    pub ontology: String,
    pub document_label: String,
    pub chunk_index: usize,
    pub full_text: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: uuid::Uuid,
    pub quote: String,
    pub from_concept_id: String,
    pub from_source_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: String,
    pub ontology: String,
    pub from_concept_id: String,
    pub to_concept_id: String,
    pub relationship_type: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Signed vocabulary weight, per spec: SUPPORTS = +1, CONTRADICTS = -1,
/// neutral = 0, otherwise any value in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportWeight(pub f64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabType {
    pub type_name: String,
    pub category: String,
    pub support_weight: SupportWeight,
    pub embedding: Option<Embedding>,
    pub is_builtin: bool,
    pub synonyms: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub usage_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    AwaitingApproval,
    Approved,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobAnalysis {
    pub chunk_count: usize,
    pub estimated_tokens: u64,
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub chunks_done: usize,
    pub chunks_total: usize,
    pub last_committed_chunk_index: Option<usize>,
    pub concepts_created: u64,
    pub concepts_updated: u64,
    pub instances_created: u64,
    pub relationships_created: u64,
    pub failed_count: u64,
    pub elapsed_ms: u64,
    /// Projected remaining runtime, extrapolated from `elapsed_ms` and the
    /// done/total chunk ratio. `0` until the first chunk commits.
    pub eta_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub cost_actual_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub error_kind: String,
    pub message: String,
    pub last_successful_chunk: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadRef {
    pub content_hash: String,
    pub source_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: uuid::Uuid,
    pub state: JobState,
    pub owner: String,
    pub ontology: String,
    pub payload_ref: PayloadRef,
    pub analysis: Option<JobAnalysis>,
    pub progress: JobProgress,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub auto_approve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub config_id: String,
    pub provider: String,
    pub model_name: String,
    pub dimensions: usize,
    pub active: bool,
    pub delete_protected: bool,
    pub change_protected: bool,
    pub created_at: DateTime<Utc>,
}
