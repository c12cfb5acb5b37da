//! Exact vector similarity index.
//!
//! The teacher's CLI (`axiograph-cli/src/llm.rs`) builds an `hnsw_rs`
//! approximate index over token-hash embeddings for fuzzy full-text lookup.
//! That is the wrong tool here: `vectorSearch` must return the *exact* top-k
//! by cosine similarity and must fail deterministically when the query
//! vector's dimension does not match the active config (P8), not silently
//! degrade. So this index is a flat, `rayon`-parallelized brute-force scan,
//! partitioned by `(model_id, dimension)` so a stale embedding from a
//! retired model is never compared against a live one.

use crate::error::{StoreError, StoreResult};
use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

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

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    id: String,
    model_id: String,
    dimension: usize,
    vector: Vec<f32>,
}

/// A single top-k hit: the indexed id and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub similarity: f32,
}

/// Flat, exact cosine-similarity index over `(id, embedding)` pairs,
/// partitioned internally by `(model_id, dimension)`. Entries from a config
/// that is no longer active simply never surface in a search against the
/// current config's vectors.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    entries: DashMap<String, Entry>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or replace the vector stored for `id`.
    pub fn upsert(&self, id: &str, model_id: &str, vector: Vec<f32>) {
        let dimension = vector.len();
        self.entries.insert(
            id.to_string(),
            Entry {
                id: id.to_string(),
                model_id: model_id.to_string(),
                dimension,
                vector,
            },
        );
    }

    pub fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact top-k search by cosine similarity against every entry whose
    /// `(model_id, dimension)` matches the query. Fails with
    /// `DimensionMismatch` rather than silently searching a different
    /// dimension, satisfying P8.
    pub fn search(
        &self,
        model_id: &str,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        active_dimension: usize,
    ) -> StoreResult<Vec<VectorHit>> {
        if query.len() != active_dimension {
            return Err(StoreError::DimensionMismatch {
                expected: active_dimension,
                got: query.len(),
            });
        }

        let candidates: Vec<Entry> = self
            .entries
            .iter()
            .filter(|e| e.model_id == model_id && e.dimension == active_dimension)
            .map(|e| e.value().clone())
            .collect();

        let mut scored: Vec<VectorHit> = candidates
            .par_iter()
            .filter_map(|entry| {
                let sim = cosine_similarity(query, &entry.vector);
                if sim >= min_similarity {
                    Some(VectorHit {
                        id: entry.id.clone(),
                        similarity: sim,
                    })
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_ranks_by_similarity_descending() {
        let idx = VectorIndex::new();
        idx.upsert("a", "m1", vec![1.0, 0.0]);
        idx.upsert("b", "m1", vec![0.0, 1.0]);
        idx.upsert("c", "m1", vec![0.9, 0.1]);

        let hits = idx.search("m1", &[1.0, 0.0], 10, 0.0, 2).unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "c");
        assert_eq!(hits[2].id, "b");
    }

    #[test]
    fn search_rejects_dimension_mismatch() {
        let idx = VectorIndex::new();
        idx.upsert("a", "m1", vec![1.0, 0.0]);
        let err = idx.search("m1", &[1.0, 0.0, 0.0], 10, 0.0, 2).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn search_ignores_entries_from_other_models() {
        let idx = VectorIndex::new();
        idx.upsert("a", "m1", vec![1.0, 0.0]);
        idx.upsert("b", "m2", vec![1.0, 0.0]);
        let hits = idx.search("m1", &[1.0, 0.0], 10, 0.0, 2).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn identical_vectors_are_maximally_similar() {
        approx::assert_relative_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0, epsilon = 1e-6);
    }

    use proptest::prelude::*;

    proptest! {
        /// Every hit `search` returns sits within `[-1, 1]` (cosine range)
        /// and the result list is sorted by descending similarity.
        #[test]
        fn search_results_are_sorted_and_in_range(
            vectors in proptest::collection::vec(proptest::collection::vec(-5.0f32..5.0, 3), 1..8),
            query in proptest::collection::vec(-5.0f32..5.0, 3),
        ) {
            let idx = VectorIndex::new();
            for (i, v) in vectors.iter().enumerate() {
                idx.upsert(&format!("id{i}"), "m1", v.clone());
            }
            let hits = idx.search("m1", &query, vectors.len(), -1.0, 3).unwrap();
            for hit in &hits {
                prop_assert!((-1.0001..=1.0001).contains(&hit.similarity));
            }
            for pair in hits.windows(2) {
                prop_assert!(pair[0].similarity >= pair[1].similarity);
            }
        }
    }
}
