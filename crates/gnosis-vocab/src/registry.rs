//! `VocabRegistry`: the canonical relationship-type vocabulary. Reads are
//! lock-free against a cloned snapshot (`Arc<HashMap<..>>`), the same
//! reference-swap shape `gnosis-providers::EmbeddingProvider::reload` uses;
//! writes (create/merge/bump-usage) serialize through a single exclusive
//! lock and a `Store` write, per the concurrency design's "reads lock-free,
//! writes take the registry lock and a Store transaction" policy.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use gnosis_providers::{EmbeddingProvider, EmbeddingRole};
use gnosis_store::{Embedding, Store, SupportWeight, VocabType};
use parking_lot::{Mutex, RwLock};

use crate::builtins::BUILTIN_TYPES;
use crate::config::VocabConfig;
use crate::error::{VocabError, VocabResult};
use crate::zone::Zone;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOutcome {
    pub canonical: String,
    pub created: bool,
    /// True when the resolution was forced to the nearest existing type
    /// under registry pressure rather than genuinely matching or being
    /// permitted to create a new one.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryStatus {
    pub size: usize,
    pub zone: Zone,
    pub aggressiveness: f32,
    pub categories: BTreeMap<String, usize>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Uppercase snake-case normalization: non-alphanumeric runs collapse to a
/// single `_`, leading/trailing `_` are trimmed.
pub fn normalize(suggestion: &str) -> String {
    let mut out = String::with_capacity(suggestion.len());
    let mut last_was_sep = false;
    for ch in suggestion.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn best_match(snapshot: &HashMap<String, VocabType>, query: &[f32]) -> Option<(String, f32)> {
    let mut best: Option<(String, f32)> = None;
    for vt in snapshot.values() {
        let Some(embedding) = &vt.embedding else { continue };
        let sim = cosine_similarity(query, &embedding.vector);
        best = match best {
            None => Some((vt.type_name.clone(), sim)),
            Some((name, s)) if sim > s || (sim == s && vt.type_name < name) => {
                Some((vt.type_name.clone(), sim))
            }
            some => some,
        };
    }
    best
}

pub struct VocabRegistry {
    pub(crate) store: Arc<Store>,
    config: VocabConfig,
    snapshot: RwLock<Arc<HashMap<String, VocabType>>>,
    write_lock: Mutex<()>,
}

impl VocabRegistry {
    pub fn new(store: Arc<Store>, config: VocabConfig) -> Self {
        let snapshot = Self::load_snapshot(&store);
        Self {
            store,
            config,
            snapshot: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        }
    }

    fn load_snapshot(store: &Store) -> HashMap<String, VocabType> {
        store
            .all_vocab_types()
            .into_iter()
            .map(|v| (v.type_name.clone(), v))
            .collect()
    }

    fn refresh(&self) {
        *self.snapshot.write() = Arc::new(Self::load_snapshot(&self.store));
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, VocabType>> {
        self.snapshot.read().clone()
    }

    pub fn size(&self) -> usize {
        self.snapshot().len()
    }

    pub fn status(&self) -> RegistryStatus {
        let snap = self.snapshot();
        let (zone, aggressiveness) = self.config.zones.zone_for(snap.len());
        let mut categories = BTreeMap::new();
        for vt in snap.values() {
            *categories.entry(vt.category.clone()).or_insert(0) += 1;
        }
        RegistryStatus {
            size: snap.len(),
            zone,
            aggressiveness,
            categories,
        }
    }

    pub fn support_weight_of(&self, type_name: &str) -> Option<f64> {
        self.snapshot().get(type_name).map(|v| v.support_weight.0)
    }

    /// Seed the `~30` built-in types (idempotent: already-present names are
    /// left untouched), embedding each with `embedder`. Returns
    /// `(embedded, expected)`; a caller that finds `embedded < expected`
    /// should report a degraded health signal rather than proceeding as if
    /// vocabulary seeding fully succeeded.
    pub async fn seed_builtins(&self, embedder: &dyn EmbeddingProvider) -> VocabResult<(usize, usize)> {
        let _guard = self.write_lock.lock();
        let expected = BUILTIN_TYPES.len();
        let missing: Vec<&'static crate::builtins::BuiltinType> = BUILTIN_TYPES
            .iter()
            .filter(|b| self.store.get_vocab_type(b.name).is_none())
            .collect();

        let texts: Vec<String> = missing
            .iter()
            .map(|b| b.name.replace('_', " ").to_lowercase())
            .collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            match embedder.embed(&texts, EmbeddingRole::Document).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "vocabulary seeding failed to embed builtin types");
                    Vec::new()
                }
            }
        };
        let model_id = embedder.config().model_name;
        let now = Utc::now();
        let mut embedded = expected - missing.len();
        for (i, b) in missing.iter().enumerate() {
            let embedding = vectors.get(i).cloned().map(|v| Embedding::new(model_id.clone(), v));
            if embedding.is_some() {
                embedded += 1;
            }
            self.store.insert_vocab_type(VocabType {
                type_name: b.name.to_string(),
                category: b.category.to_string(),
                support_weight: SupportWeight(b.support_weight),
                embedding,
                is_builtin: true,
                synonyms: Vec::new(),
                created_at: now,
                usage_count: 0,
            });
        }
        self.refresh();
        Ok((embedded, expected))
    }

    /// `resolve(type_name_suggestion, embedding) -> canonical_type_name`, per
    /// the registry algorithm: normalize, exact match, vector match against
    /// the effective merge threshold, zone-gated creation, else degraded
    /// nearest-match merge.
    pub fn resolve(&self, type_name_suggestion: &str, embedding: &[f32]) -> VocabResult<ResolveOutcome> {
        let normalized = normalize(type_name_suggestion);

        if self.snapshot().contains_key(&normalized) {
            self.bump_usage(&normalized);
            return Ok(ResolveOutcome { canonical: normalized, created: false, degraded: false });
        }

        let _guard = self.write_lock.lock();
        // Re-check under the exclusive lock: a concurrent resolve may have
        // just created or merged this exact name while we waited.
        if self.store.get_vocab_type(&normalized).is_some() {
            drop(_guard);
            self.bump_usage(&normalized);
            return Ok(ResolveOutcome { canonical: normalized, created: false, degraded: false });
        }

        let snap = self.snapshot();
        if snap.is_empty() {
            self.create_locked(&normalized, embedding, None);
            return Ok(ResolveOutcome { canonical: normalized, created: true, degraded: false });
        }

        let (best_name, best_sim) = best_match(&snap, embedding).ok_or(VocabError::EmptyRegistry)?;
        let (zone, aggressiveness) = self.config.zones.zone_for(snap.len());
        let effective_merge = self.config.zones.effective_merge_threshold(aggressiveness);

        if best_sim >= effective_merge {
            self.attach_synonym_locked(&best_name, &normalized);
            return Ok(ResolveOutcome { canonical: best_name, created: false, degraded: false });
        }

        if self.config.zones.permits_creation(zone, best_sim, aggressiveness) {
            self.create_locked(&normalized, embedding, None);
            return Ok(ResolveOutcome { canonical: normalized, created: true, degraded: false });
        }

        tracing::warn!(
            suggestion = %normalized,
            nearest = %best_name,
            similarity = best_sim,
            zone = ?zone,
            "vocabulary degraded merge: registry pressure forced nearest-match instead of a new type"
        );
        self.attach_synonym_locked(&best_name, &normalized);
        Ok(ResolveOutcome { canonical: best_name, created: false, degraded: true })
    }

    /// Administrative merge: redirect `a`'s edges to `b`, copy synonyms,
    /// delete `a`. Transactional via the Store.
    pub fn merge(&self, a: &str, b: &str, reason: &str) -> VocabResult<()> {
        let _guard = self.write_lock.lock();
        self.store.merge_vocab_types(a, b)?;
        tracing::info!(from = %a, to = %b, reason, "merged vocabulary types");
        self.refresh();
        Ok(())
    }

    /// Re-embed every type in the registry with `embedder`, under the full
    /// exclusive lock (a rebuild touches every row, so there is no
    /// meaningful partial-write state to expose to readers mid-flight).
    pub async fn reload_embeddings(&self, embedder: &dyn EmbeddingProvider) -> VocabResult<usize> {
        let _guard = self.write_lock.lock();
        let types = self.store.all_vocab_types();
        if types.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = types
            .iter()
            .map(|t| {
                let mut parts = vec![t.type_name.replace('_', " ").to_lowercase()];
                parts.extend(t.synonyms.iter().cloned());
                parts.join(" ")
            })
            .collect();
        let vectors = embedder.embed(&texts, EmbeddingRole::Document).await?;
        let model_id = embedder.config().model_name;
        let mut updated = 0;
        for (mut vt, vector) in types.into_iter().zip(vectors.into_iter()) {
            vt.embedding = Some(Embedding::new(model_id.clone(), vector));
            self.store.insert_vocab_type(vt);
            updated += 1;
        }
        self.refresh();
        Ok(updated)
    }

    fn create_locked(&self, normalized: &str, embedding: &[f32], category: Option<&str>) {
        let model_id = self
            .store
            .active_embedding_config()
            .map(|c| c.model_name)
            .unwrap_or_else(|| "unknown".to_string());
        self.store.insert_vocab_type(VocabType {
            type_name: normalized.to_string(),
            category: category.unwrap_or(&self.config.default_category).to_string(),
            support_weight: SupportWeight(0.0),
            embedding: Some(Embedding::new(model_id, embedding.to_vec())),
            is_builtin: false,
            synonyms: Vec::new(),
            created_at: Utc::now(),
            usage_count: 1,
        });
        self.refresh();
    }

    fn attach_synonym_locked(&self, canonical: &str, synonym: &str) {
        if let Some(mut vt) = self.store.get_vocab_type(canonical) {
            if synonym != canonical && !vt.synonyms.iter().any(|s| s == synonym) {
                vt.synonyms.push(synonym.to_string());
            }
            vt.usage_count += 1;
            self.store.insert_vocab_type(vt);
            self.refresh();
        }
    }

    fn bump_usage(&self, type_name: &str) {
        let _guard = self.write_lock.lock();
        if let Some(mut vt) = self.store.get_vocab_type(type_name) {
            vt.usage_count += 1;
            self.store.insert_vocab_type(vt);
            self.refresh();
        }
    }
}
