//! Relational tables: `jobs`, `embedding_configs`, `vocab_types`, and the
//! `schema_migrations` ledger. Kept as plain in-memory maps behind the
//! Store's transaction lock, the same shape the teacher's `UnifiedStorage`
//! uses for its changelog — a `Vec`/`HashMap` guarded by `parking_lot`,
//! snapshotted to disk with `bincode` rather than a real SQL engine, since
//! this system owns its own durability story end to end.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::types::{EmbeddingConfig, Job, JobState, VocabType};

#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: chrono::DateTime<Utc>,
}

#[derive(Default, Clone)]
pub struct RelationalStore {
    jobs: HashMap<Uuid, Job>,
    embedding_configs: HashMap<String, EmbeddingConfig>,
    vocab_types: HashMap<String, VocabType>,
    migrations: Vec<MigrationRecord>,
}

impl RelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Jobs -----------------------------------------------------------------

    pub fn insert_job(&mut self, job: Job) {
        self.jobs.insert(job.job_id, job);
    }

    pub fn get_job(&self, job_id: Uuid) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn get_job_mut(&mut self, job_id: Uuid) -> Option<&mut Job> {
        self.jobs.get_mut(&job_id)
    }

    pub fn find_active_job_by_payload(&self, content_hash: &str, ontology: &str) -> Option<&Job> {
        self.jobs.values().find(|j| {
            j.payload_ref.content_hash == content_hash
                && j.ontology == ontology
                && !j.state.is_terminal()
        })
    }

    pub fn list_jobs<'a>(
        &'a self,
        owner: Option<&'a str>,
        ontology: Option<&'a str>,
        state: Option<JobState>,
        since: Option<chrono::DateTime<Utc>>,
        until: Option<chrono::DateTime<Utc>>,
    ) -> Vec<&'a Job> {
        self.jobs
            .values()
            .filter(|j| owner.map_or(true, |o| j.owner == o))
            .filter(|j| ontology.map_or(true, |o| j.ontology == o))
            .filter(|j| state.map_or(true, |s| j.state == s))
            .filter(|j| since.map_or(true, |t| j.created_at >= t))
            .filter(|j| until.map_or(true, |t| j.created_at <= t))
            .collect()
    }

    pub fn earliest_approved(&self) -> Option<&Job> {
        self.jobs
            .values()
            .filter(|j| j.state == JobState::Approved)
            .min_by_key(|j| j.created_at)
    }

    pub fn earliest_pending(&self) -> Option<&Job> {
        self.jobs
            .values()
            .filter(|j| j.state == JobState::Pending)
            .min_by_key(|j| j.created_at)
    }

    pub fn delete_job(&mut self, job_id: Uuid) -> StoreResult<()> {
        self.jobs
            .remove(&job_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))
    }

    pub fn sweep_terminal_older_than(&mut self, cutoff: chrono::DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, j| !(j.state.is_terminal() && j.updated_at < cutoff));
        before - self.jobs.len()
    }

    // -- Embedding configs ------------------------------------------------------

    pub fn get_embedding_config(&self, config_id: &str) -> Option<&EmbeddingConfig> {
        self.embedding_configs.get(config_id)
    }

    pub fn active_embedding_config(&self) -> Option<&EmbeddingConfig> {
        self.embedding_configs.values().find(|c| c.active)
    }

    pub fn list_embedding_configs(&self) -> Vec<&EmbeddingConfig> {
        self.embedding_configs.values().collect()
    }

    pub fn insert_embedding_config(&mut self, config: EmbeddingConfig) {
        self.embedding_configs.insert(config.config_id.clone(), config);
    }

    /// Activate `config_id`, deactivating whatever was previously active.
    /// Enforces the exactly-one-active invariant as an atomic swap, per the
    /// design note on singleton active configs. Refused if the currently
    /// active config is `change_protected`.
    pub fn activate_embedding_config(&mut self, config_id: &str) -> StoreResult<()> {
        if !self.embedding_configs.contains_key(config_id) {
            return Err(StoreError::NotFound(format!("embedding config {config_id}")));
        }
        if let Some(active) = self.active_embedding_config() {
            if active.change_protected && active.config_id != config_id {
                return Err(StoreError::Constraint(format!(
                    "embedding config {} is change-protected",
                    active.config_id
                )));
            }
        }
        for (id, cfg) in self.embedding_configs.iter_mut() {
            cfg.active = id == config_id;
        }
        Ok(())
    }

    pub fn deactivate_embedding_config(&mut self, config_id: &str) -> StoreResult<()> {
        let cfg = self
            .embedding_configs
            .get_mut(config_id)
            .ok_or_else(|| StoreError::NotFound(format!("embedding config {config_id}")))?;
        if cfg.change_protected {
            return Err(StoreError::Constraint(format!(
                "embedding config {config_id} is change-protected"
            )));
        }
        cfg.active = false;
        Ok(())
    }

    pub fn remove_embedding_config(&mut self, config_id: &str) -> StoreResult<()> {
        let cfg = self
            .embedding_configs
            .get(config_id)
            .ok_or_else(|| StoreError::NotFound(format!("embedding config {config_id}")))?;
        if cfg.delete_protected {
            return Err(StoreError::Constraint(format!(
                "embedding config {config_id} is delete-protected"
            )));
        }
        self.embedding_configs.remove(config_id);
        Ok(())
    }

    /// Toggle the protection flags for `config_id`. `None` leaves a flag as
    /// it was; used by `protect`/`unprotect` to flip one or both
    /// independently.
    pub fn set_embedding_config_protection(
        &mut self,
        config_id: &str,
        delete_protected: Option<bool>,
        change_protected: Option<bool>,
    ) -> StoreResult<()> {
        let cfg = self
            .embedding_configs
            .get_mut(config_id)
            .ok_or_else(|| StoreError::NotFound(format!("embedding config {config_id}")))?;
        if let Some(d) = delete_protected {
            cfg.delete_protected = d;
        }
        if let Some(c) = change_protected {
            cfg.change_protected = c;
        }
        Ok(())
    }

    // -- Vocab types --------------------------------------------------------

    pub fn get_vocab_type(&self, type_name: &str) -> Option<&VocabType> {
        self.vocab_types.get(type_name)
    }

    pub fn insert_vocab_type(&mut self, vt: VocabType) {
        self.vocab_types.insert(vt.type_name.clone(), vt);
    }

    pub fn remove_vocab_type(&mut self, type_name: &str) -> Option<VocabType> {
        self.vocab_types.remove(type_name)
    }

    pub fn all_vocab_types(&self) -> impl Iterator<Item = &VocabType> {
        self.vocab_types.values()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_types.len()
    }

    // -- Migrations -----------------------------------------------------------

    pub fn applied_migration_versions(&self) -> Vec<i64> {
        self.migrations.iter().map(|m| m.version).collect()
    }

    pub fn record_migration(&mut self, version: i64, name: String) {
        self.migrations.push(MigrationRecord {
            version,
            name,
            applied_at: Utc::now(),
        });
    }

    pub fn schema_version(&self) -> i64 {
        self.migrations.iter().map(|m| m.version).max().unwrap_or(0)
    }
}
