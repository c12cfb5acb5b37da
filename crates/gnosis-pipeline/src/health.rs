//! `HealthStatus`: a `degraded` signal (rather than silent success) when
//! fewer built-in vocabulary types got embedded than expected, or when no
//! embedding config is active — resolving the spec's open question about
//! what a caller should see when vocabulary seeding partially fails.

use gnosis_store::Store;
use gnosis_vocab::{builtins::BUILTIN_TYPES, VocabRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub schema_version: i64,
    pub epoch: u64,
    pub vocabulary_size: usize,
    pub vocabulary_expected: usize,
    pub active_embedding_config: bool,
    pub reasons: Vec<String>,
}

pub fn check(store: &Store, vocab: &VocabRegistry) -> HealthStatus {
    let mut reasons = Vec::new();
    let vocabulary_size = vocab.size();
    let vocabulary_expected = BUILTIN_TYPES.len();
    if vocabulary_size < vocabulary_expected {
        reasons.push(format!("vocabulary seeded {vocabulary_size}/{vocabulary_expected} builtin types"));
    }

    let active_embedding_config = store.active_embedding_config().is_some();
    if !active_embedding_config {
        reasons.push("no active embedding config".to_string());
    }

    HealthStatus {
        healthy: reasons.is_empty(),
        schema_version: store.schema_version(),
        epoch: store.epoch(),
        vocabulary_size,
        vocabulary_expected,
        active_embedding_config,
        reasons,
    }
}
