//! The Store: persistent state for jobs, vocabulary and embedding configs; a
//! property-graph namespace for concepts/sources/instances/relationships; a
//! vector index. Everything lives behind one `parking_lot::RwLock`, the same
//! way the teacher's `UnifiedStorage` wraps a `PathDB` — there is one
//! logical store, and callers serialize through `with_tx` for multi-step
//! writes rather than the store internally sharding locks per table.

pub mod config;
pub mod error;
pub mod graph;
pub mod migration;
pub mod relational;
pub mod types;
pub mod vector;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use graph::GraphStore;
pub use migration::{builtin_migrations, Migration};
pub use relational::RelationalStore;
pub use types::*;
pub use vector::{VectorHit, VectorIndex};

// `GraphStore`/`RelationalStore` don't derive Serialize/Deserialize (their
// fields are plain in-memory indexes, not wire types), so the snapshot is
// persisted through a dedicated on-disk representation instead.
mod persist {
    use super::*;

    #[derive(Serialize, Deserialize)]
    pub struct OnDisk {
        pub concepts: Vec<Concept>,
        pub sources: Vec<Source>,
        pub instances: Vec<Instance>,
        pub relationships: Vec<Relationship>,
        pub jobs: Vec<Job>,
        pub embedding_configs: Vec<EmbeddingConfig>,
        pub vocab_types: Vec<VocabType>,
        pub migrations: Vec<(i64, String, DateTime<Utc>)>,
        pub epoch: u64,
    }
}

/// Mutable access to the graph and relational tables inside one
/// transactional block. The vector index is reached separately since its
/// entries carry interior mutability and do not need to be rolled back
/// through the snapshot/restore path below in the common case — but
/// `with_tx` snapshots it too, so a mid-transaction failure never leaves a
/// concept write and its vector entry out of sync.
pub struct TxContext<'a> {
    pub graph: &'a mut GraphStore,
    pub relational: &'a mut RelationalStore,
    pub vector: &'a VectorIndex,
}

pub struct Store {
    config: StoreConfig,
    state: RwLock<InnerState>,
    epoch: AtomicU64,
}

struct InnerState {
    graph: GraphStore,
    relational: RelationalStore,
    vector: VectorIndex,
}

impl Store {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let store = Self {
            config,
            state: RwLock::new(InnerState {
                graph: GraphStore::new(),
                relational: RelationalStore::new(),
                vector: VectorIndex::new(),
            }),
            epoch: AtomicU64::new(0),
        };
        if let Some(path) = store.config.snapshot_path.clone() {
            if path.exists() {
                store.load(&path)?;
            }
        }
        {
            let mut state = store.state.write();
            migration::run_pending(&mut state.relational, &builtin_migrations())?;
        }
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Scoped transactional block: `f` receives mutable graph/relational
    /// access and read access to the vector index. On `Ok`, the mutation is
    /// kept; on `Err`, graph/relational/vector state is rolled back to
    /// exactly what it was before `f` ran. Guaranteed commit-or-rollback on
    /// every exit path, including a panic unwinding through `f` (the lock is
    /// released via `parking_lot`'s poison-free guard either way, and the
    /// clone taken up front is simply discarded).
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&mut TxContext) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = self.state.write();
        let graph_snapshot = state.graph.clone();
        let relational_snapshot = state.relational.clone();
        let vector_snapshot = state.vector.clone();

        let mut ctx = TxContext {
            graph: &mut state.graph,
            relational: &mut state.relational,
            vector: &state.vector,
        };
        match f(&mut ctx) {
            Ok(value) => Ok(value),
            Err(e) => {
                state.graph = graph_snapshot;
                state.relational = relational_snapshot;
                state.vector = vector_snapshot;
                Err(e)
            }
        }
    }

    /// Exact top-k cosine-similarity search against the active
    /// `EmbeddingConfig`'s model/dimension. Fails with `DimensionMismatch`
    /// rather than silently searching the wrong space (P8).
    pub fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> StoreResult<Vec<VectorHit>> {
        let state = self.state.read();
        let active = state
            .relational
            .active_embedding_config()
            .ok_or_else(|| StoreError::Constraint("no active embedding config".into()))?;
        state
            .vector
            .search(&active.model_name, query, k, min_similarity, active.dimensions)
    }

    /// Index (or re-index) `concept_id`'s embedding, tagging it incompatible
    /// if it does not match the active config's model/dimension.
    pub fn index_concept_embedding(&self, concept_id: &str, embedding: &Embedding) {
        let state = self.state.read();
        let compatible = state
            .relational
            .active_embedding_config()
            .map(|c| c.model_name == embedding.model_id && c.dimensions == embedding.dimension)
            .unwrap_or(false);
        if compatible {
            state.vector.upsert(concept_id, &embedding.model_id, embedding.vector.clone());
        } else {
            state.vector.remove(concept_id);
        }
    }

    /// Monotone epoch, incremented once per job reaching `completed`.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn schema_version(&self) -> i64 {
        self.state.read().relational.schema_version()
    }

    // -- Read-mostly accessors, used by the query surface and by crates that
    // don't need the transactional rollback path (single-field reads/writes
    // are already atomic under the RwLock). --------------------------------

    pub fn get_concept(&self, concept_id: &str) -> Option<Concept> {
        self.state.read().graph.get_concept(concept_id).cloned()
    }

    pub fn concepts_in_ontology(&self, ontology: &str) -> Vec<Concept> {
        self.state
            .read()
            .graph
            .concepts_in_ontology(ontology)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn instances_for_concept(&self, concept_id: &str) -> Vec<Instance> {
        self.state
            .read()
            .graph
            .instances_for_concept(concept_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn relationships_touching(&self, concept_id: &str) -> Vec<Relationship> {
        self.state
            .read()
            .graph
            .relationships_touching(concept_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn all_relationships(&self) -> Vec<Relationship> {
        self.state.read().graph.all_relationships().cloned().collect()
    }

    /// Set a concept's recomputed grounding strength.
    pub fn set_grounding(&self, concept_id: &str, grounding: Option<f64>) -> StoreResult<()> {
        let mut state = self.state.write();
        let concept = state
            .graph
            .get_concept(concept_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("concept {concept_id}")))?;
        let mut concept = concept;
        concept.grounding_strength = grounding;
        concept.updated_at = Utc::now();
        state.graph.upsert_concept(concept);
        Ok(())
    }

    pub fn find_source_by_content_hash(&self, ontology: &str, content_hash: &str) -> Option<Source> {
        self.state
            .read()
            .graph
            .find_source_by_content_hash(ontology, content_hash)
            .cloned()
    }

    /// Removes every source in `ontology`, cascading to any concept whose
    /// last remaining source was one of them, and drops those concepts'
    /// vector-index entries alongside the graph rows.
    pub fn delete_ontology(&self, ontology: &str) -> StoreResult<usize> {
        self.with_tx(|tx| {
            let deleted = tx.graph.cascade_delete_ontology(ontology);
            for concept_id in &deleted {
                tx.vector.remove(concept_id);
            }
            Ok(deleted.len())
        })
    }

    // -- Jobs -------------------------------------------------------------

    pub fn insert_job(&self, job: Job) {
        self.state.write().relational.insert_job(job)
    }

    pub fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.state.read().relational.get_job(job_id).cloned()
    }

    pub fn find_active_job_by_payload(&self, content_hash: &str, ontology: &str) -> Option<Job> {
        self.state
            .read()
            .relational
            .find_active_job_by_payload(content_hash, ontology)
            .cloned()
    }

    pub fn list_jobs(
        &self,
        owner: Option<&str>,
        ontology: Option<&str>,
        state_filter: Option<JobState>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<Job> {
        self.state
            .read()
            .relational
            .list_jobs(owner, ontology, state_filter, since, until)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn earliest_approved_job(&self) -> Option<Job> {
        self.state.read().relational.earliest_approved().cloned()
    }

    pub fn earliest_pending_job(&self) -> Option<Job> {
        self.state.read().relational.earliest_pending().cloned()
    }

    /// Replace a job wholesale; callers (JobQueue) own the state-machine
    /// validation and call this once a transition is decided.
    pub fn update_job(&self, job: Job) {
        let was_completed = job.state == JobState::Completed;
        self.state.write().relational.insert_job(job);
        if was_completed {
            self.advance_epoch();
        }
    }

    pub fn delete_job(&self, job_id: Uuid) -> StoreResult<()> {
        self.state.write().relational.delete_job(job_id)
    }

    pub fn sweep_terminal_jobs_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        self.state.write().relational.sweep_terminal_older_than(cutoff)
    }

    // -- Embedding configs --------------------------------------------------

    pub fn active_embedding_config(&self) -> Option<EmbeddingConfig> {
        self.state.read().relational.active_embedding_config().cloned()
    }

    pub fn get_embedding_config(&self, config_id: &str) -> Option<EmbeddingConfig> {
        self.state.read().relational.get_embedding_config(config_id).cloned()
    }

    pub fn list_embedding_configs(&self) -> Vec<EmbeddingConfig> {
        self.state.read().relational.list_embedding_configs().into_iter().cloned().collect()
    }

    pub fn insert_embedding_config(&self, config: EmbeddingConfig) {
        self.state.write().relational.insert_embedding_config(config)
    }

    /// Activate `config_id`. Refused if it changes `dimensions` from the
    /// current active config unless `force`; on success, every existing
    /// concept is tagged incompatible until bulk re-embedded.
    pub fn activate_embedding_config(&self, config_id: &str, force: bool) -> StoreResult<()> {
        let mut state = self.state.write();
        let new_dims = state
            .relational
            .get_embedding_config(config_id)
            .ok_or_else(|| StoreError::NotFound(format!("embedding config {config_id}")))?
            .dimensions;
        let dims_changed = state
            .relational
            .active_embedding_config()
            .map(|c| c.dimensions != new_dims)
            .unwrap_or(false);
        if dims_changed && !force {
            return Err(StoreError::Constraint(
                "activation changes embedding dimensions; retry with force=true".into(),
            ));
        }
        state.relational.activate_embedding_config(config_id)?;
        if dims_changed {
            let ids: Vec<String> = state.graph.all_concepts().map(|c| c.concept_id.clone()).collect();
            for id in ids {
                if let Some(mut concept) = state.graph.get_concept(&id).cloned() {
                    concept.embedding_status = EmbeddingStatus::Incompatible;
                    state.graph.upsert_concept(concept);
                }
                state.vector.remove(&id);
            }
        }
        Ok(())
    }

    pub fn deactivate_embedding_config(&self, config_id: &str) -> StoreResult<()> {
        self.state.write().relational.deactivate_embedding_config(config_id)
    }

    pub fn remove_embedding_config(&self, config_id: &str) -> StoreResult<()> {
        self.state.write().relational.remove_embedding_config(config_id)
    }

    /// Mark `config_id` delete- and change-protected, refusing the admin
    /// operations (`remove_embedding_config`, `activate_embedding_config`
    /// away from it, `deactivate_embedding_config`) that would otherwise
    /// touch it.
    pub fn protect_embedding_config(&self, config_id: &str) -> StoreResult<()> {
        self.state
            .write()
            .relational
            .set_embedding_config_protection(config_id, Some(true), Some(true))
    }

    /// Clear both protection flags set by `protect_embedding_config`.
    pub fn unprotect_embedding_config(&self, config_id: &str) -> StoreResult<()> {
        self.state
            .write()
            .relational
            .set_embedding_config_protection(config_id, Some(false), Some(false))
    }

    // -- Vocabulary ---------------------------------------------------------

    pub fn get_vocab_type(&self, type_name: &str) -> Option<VocabType> {
        self.state.read().relational.get_vocab_type(type_name).cloned()
    }

    pub fn insert_vocab_type(&self, vt: VocabType) {
        self.state.write().relational.insert_vocab_type(vt)
    }

    pub fn all_vocab_types(&self) -> Vec<VocabType> {
        self.state.read().relational.all_vocab_types().cloned().collect()
    }

    pub fn vocab_size(&self) -> usize {
        self.state.read().relational.vocab_size()
    }

    /// Administrative merge: redirect every relationship of type `a` to
    /// type `b`, copy `a`'s synonyms into `b`, delete `a`. Transactional.
    pub fn merge_vocab_types(&self, a: &str, b: &str) -> StoreResult<()> {
        self.with_tx(|tx| {
            let mut from = tx
                .relational
                .get_vocab_type(a)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("vocab type {a}")))?;
            let mut to = tx
                .relational
                .get_vocab_type(b)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("vocab type {b}")))?;
            for syn in from.synonyms.drain(..) {
                if !to.synonyms.contains(&syn) {
                    to.synonyms.push(syn);
                }
            }
            if !to.synonyms.contains(&from.type_name) {
                to.synonyms.push(from.type_name.clone());
            }
            tx.relational.insert_vocab_type(to);
            tx.relational.remove_vocab_type(a);
            tx.graph.delete_relationships_referencing(a, Some(b));
            Ok(())
        })
    }

    // -- Persistence ----------------------------------------------------------

    fn load(&self, path: &Path) -> StoreResult<()> {
        let bytes = std::fs::read(path)?;
        let on_disk: persist::OnDisk = bincode::deserialize(&bytes)?;
        let mut state = self.state.write();
        for concept in on_disk.concepts {
            if let Some(embedding) = &concept.embedding {
                state.vector.upsert(&concept.concept_id, &embedding.model_id, embedding.vector.clone());
            }
            state.graph.upsert_concept(concept);
        }
        for source in on_disk.sources {
            state.graph.insert_source(source);
        }
        for instance in on_disk.instances {
            // Replays the Source->Concept APPEARS_IN link implied by every
            // instance, since that link itself isn't separately persisted.
            let _ = state.graph.link_source(&instance.from_source_id, &instance.from_concept_id);
            let _ = state.graph.insert_instance(
                instance.quote,
                instance.from_concept_id,
                instance.from_source_id,
            );
        }
        for relationship in on_disk.relationships {
            let _ = state.graph.upsert_relationship(
                relationship.relationship_id,
                relationship.ontology,
                relationship.from_concept_id,
                relationship.to_concept_id,
                relationship.relationship_type,
                relationship.confidence,
            );
        }
        for job in on_disk.jobs {
            state.relational.insert_job(job);
        }
        for config in on_disk.embedding_configs {
            state.relational.insert_embedding_config(config);
        }
        for vt in on_disk.vocab_types {
            state.relational.insert_vocab_type(vt);
        }
        for (version, name, _) in on_disk.migrations {
            state.relational.record_migration(version, name);
        }
        self.epoch.store(on_disk.epoch, Ordering::SeqCst);
        Ok(())
    }

    /// Snapshot the full store to `snapshot_path`, if configured.
    pub fn save(&self) -> StoreResult<()> {
        let Some(path) = self.config.snapshot_path.clone() else {
            return Ok(());
        };
        let state = self.state.read();
        let on_disk = persist::OnDisk {
            concepts: state.graph.all_concepts().cloned().collect(),
            sources: state.graph.all_sources().cloned().collect(),
            instances: state.graph.all_instances().cloned().collect(),
            relationships: state.graph.all_relationships().cloned().collect(),
            jobs: state.relational.list_jobs(None, None, None, None, None).into_iter().cloned().collect(),
            embedding_configs: state.relational.list_embedding_configs().into_iter().cloned().collect(),
            vocab_types: state.relational.all_vocab_types().cloned().collect(),
            migrations: state
                .relational
                .applied_migration_versions()
                .into_iter()
                .map(|v| (v, String::new(), Utc::now()))
                .collect(),
            epoch: self.epoch(),
        };
        let bytes = bincode::serialize(&on_disk)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(())
    }
}
