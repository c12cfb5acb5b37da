//! `UpsertEngine`: turns one chunk's `ExtractionResult` into graph
//! mutations — concept resolve-or-create, source linking, instance
//! verification, relationship upsert via the vocabulary registry, and
//! grounding recomputation for every touched concept.
//!
//! Concept resolution is serialized per ontology (a `DashMap`-keyed async
//! mutex, one per-document write lock) so two chunks of the same document
//! never race to create two near-duplicate concepts; the mutex is
//! held only across the vector-search-then-write `Store` transaction, never
//! across an embedding-provider call, so a slow provider round-trip never
//! head-of-line-blocks unrelated ontologies.
//!
//! The rest of one chunk's effects (instances, relationships, grounding) are
//! not folded into the same transaction as concept resolution: each concept
//! commits as soon as it is resolved (per the concurrency note above), and
//! instances/relationships commit together in one further transaction once
//! every concept in the chunk has a resolved id. A failure partway through
//! relationship upsert rolls back the relationships/instances written so
//! far in that second transaction, but not concepts already committed in the
//! first — an intentional, narrower atomicity than "the whole extraction is
//! one transaction", recorded in the root design notes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use gnosis_providers::{ConceptCandidate, EmbeddingProvider, EmbeddingRole, ExtractionResult};
use gnosis_store::{Concept, Embedding, EmbeddingStatus, Source, Store, StoreError};
use gnosis_vocab::VocabRegistry;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::PipelineResult;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    pub concepts_created: u64,
    pub concepts_updated: u64,
    pub instances_created: u64,
    pub instances_skipped: u64,
    pub relationships_created: u64,
    pub relationships_updated: u64,
    pub relationships_dropped: u64,
}

pub struct UpsertEngine {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    vocab: Arc<VocabRegistry>,
    ontology_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl UpsertEngine {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>, vocab: Arc<VocabRegistry>) -> Self {
        Self {
            store,
            embedder,
            vocab,
            ontology_locks: DashMap::new(),
        }
    }

    fn ontology_lock(&self, ontology: &str) -> Arc<AsyncMutex<()>> {
        self.ontology_locks
            .entry(ontology.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Apply one chunk's extraction result against `source` in `ontology`.
    /// `context_concept_ids` are the ids the extraction was shown (the
    /// worker's rolling context window) — a `concept_id_suggestion` matching
    /// one of these, or matching any id already in the store, is promoted to
    /// UPDATE instead of going through embedding-similarity matching.
    pub async fn apply(
        &self,
        extraction: &ExtractionResult,
        source: &Source,
        ontology: &str,
        context_concept_ids: &[String],
    ) -> PipelineResult<UpsertReport> {
        let mut report = UpsertReport::default();
        let mut resolved: HashMap<String, String> = HashMap::new();

        for candidate in &extraction.concepts {
            let key = candidate.concept_id_suggestion.clone().unwrap_or_else(|| candidate.label.clone());
            let concept_id = self.resolve_concept(candidate, source, ontology, context_concept_ids, &mut report).await?;
            self.store.with_tx(|tx| tx.graph.link_source(&source.source_id, &concept_id).map(|_| ()))?;
            resolved.insert(key, concept_id);
        }

        // Relationship types are resolved (and, when novel, created in the
        // vocabulary) before the final transaction, since VocabRegistry's own
        // write path is not itself a Store-transaction participant.
        let mut relationship_writes = Vec::with_capacity(extraction.relationships.len());
        for rel in &extraction.relationships {
            let (Some(from_id), Some(to_id)) = (resolved.get(&rel.from), resolved.get(&rel.to)) else {
                tracing::warn!(from = %rel.from, to = %rel.to, "dropping relationship: unresolved endpoint");
                report.relationships_dropped += 1;
                continue;
            };
            let vectors = self.embedder.embed(&[rel.relationship_type.clone()], EmbeddingRole::Document).await?;
            let embedding = vectors.into_iter().next().unwrap_or_default();
            let outcome = self.vocab.resolve(&rel.relationship_type, &embedding)?;

            if from_id == to_id && matches!(outcome.canonical.as_str(), "SUPPORTS" | "CONTRADICTS") {
                tracing::warn!(concept = %from_id, relationship_type = %outcome.canonical, "dropping self-loop of signed relationship type");
                report.relationships_dropped += 1;
                continue;
            }

            let relationship_id = gnosis_dsl::relationship_id(ontology, from_id, &outcome.canonical, to_id);
            relationship_writes.push((relationship_id, from_id.clone(), to_id.clone(), outcome.canonical, rel.confidence));
        }

        let mut touched_concepts: HashSet<String> = HashSet::new();
        self.store.with_tx(|tx| {
            for inst in &extraction.instances {
                let Some(concept_id) = resolved.get(&inst.concept_id_suggestion) else {
                    report.instances_skipped += 1;
                    continue;
                };
                if !source.full_text.contains(&inst.quote) {
                    report.instances_skipped += 1;
                    continue;
                }
                tx.graph.insert_instance(inst.quote.clone(), concept_id.clone(), source.source_id.clone())?;
                report.instances_created += 1;
            }

            for (relationship_id, from_id, to_id, rel_type, confidence) in &relationship_writes {
                let existed = tx.graph.get_relationship(relationship_id).is_some();
                tx.graph.upsert_relationship(
                    relationship_id.clone(),
                    ontology.to_string(),
                    from_id.clone(),
                    to_id.clone(),
                    rel_type.clone(),
                    *confidence,
                )?;
                if existed {
                    report.relationships_updated += 1;
                } else {
                    report.relationships_created += 1;
                }
                touched_concepts.insert(from_id.clone());
                touched_concepts.insert(to_id.clone());
            }
            Ok(())
        })?;

        for concept_id in touched_concepts {
            let edges = self.store.relationships_touching(&concept_id);
            let grounding = gnosis_vocab::compute_grounding(&self.vocab, &edges);
            self.store.set_grounding(&concept_id, grounding)?;
        }

        Ok(report)
    }

    async fn resolve_concept(
        &self,
        candidate: &ConceptCandidate,
        source: &Source,
        ontology: &str,
        context_concept_ids: &[String],
        report: &mut UpsertReport,
    ) -> PipelineResult<String> {
        if let Some(suggestion_id) = &candidate.concept_id_suggestion {
            let known = context_concept_ids.iter().any(|c| c == suggestion_id) || self.store.get_concept(suggestion_id).is_some();
            if known {
                return self.update_concept(suggestion_id, candidate, report).await;
            }
        }

        let text = format!("{} {}", candidate.label, candidate.search_terms.join(" "));
        let vectors = self.embedder.embed(&[text], EmbeddingRole::Document).await?;
        let embedding_vec = vectors.into_iter().next().unwrap_or_default();
        let model_id = self.embedder.config().model_name;
        let threshold = self.store.config().concept_match_threshold;
        let new_id = gnosis_dsl::concept_id(&source.source_id, ontology, &candidate.label);
        let new_terms = dedup_case_insensitive(&candidate.search_terms);

        let lock = self.ontology_lock(ontology);
        let _guard = lock.lock().await;

        let (concept_id, created) = self.store.with_tx(|tx| {
            let merged_id = match tx.relational.active_embedding_config() {
                Some(cfg) if embedding_vec.len() == cfg.dimensions => {
                    let hits = tx.vector.search(&cfg.model_name, &embedding_vec, 1, threshold, cfg.dimensions)?;
                    hits.into_iter().next().map(|h| h.id)
                }
                _ => None,
            };

            match merged_id {
                Some(existing_id) => {
                    let mut concept = tx
                        .graph
                        .get_concept(&existing_id)
                        .cloned()
                        .ok_or_else(|| StoreError::NotFound(format!("concept {existing_id}")))?;
                    merge_search_terms(&mut concept, &new_terms);
                    concept.embedding = Some(Embedding::new(model_id.clone(), embedding_vec.clone()));
                    concept.embedding_status = EmbeddingStatus::Compatible;
                    concept.updated_at = Utc::now();
                    tx.graph.upsert_concept(concept);
                    tx.vector.upsert(&existing_id, &model_id, embedding_vec.clone());
                    Ok((existing_id, false))
                }
                None => {
                    let mut concept = Concept::new(new_id.clone(), candidate.label.clone(), Utc::now());
                    concept.search_terms = new_terms.clone();
                    concept.embedding = Some(Embedding::new(model_id.clone(), embedding_vec.clone()));
                    concept.embedding_status = EmbeddingStatus::Compatible;
                    tx.graph.upsert_concept(concept);
                    tx.vector.upsert(&new_id, &model_id, embedding_vec.clone());
                    Ok((new_id.clone(), true))
                }
            }
        })?;

        if created {
            report.concepts_created += 1;
        } else {
            report.concepts_updated += 1;
        }
        Ok(concept_id)
    }

    async fn update_concept(&self, concept_id: &str, candidate: &ConceptCandidate, report: &mut UpsertReport) -> PipelineResult<String> {
        let text = format!("{} {}", candidate.label, candidate.search_terms.join(" "));
        let vectors = self.embedder.embed(&[text], EmbeddingRole::Document).await?;
        let embedding_vec = vectors.into_iter().next().unwrap_or_default();
        let model_id = self.embedder.config().model_name;
        let new_terms = dedup_case_insensitive(&candidate.search_terms);
        let concept_id = concept_id.to_string();

        self.store.with_tx(|tx| {
            let mut concept = tx
                .graph
                .get_concept(&concept_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("concept {concept_id}")))?;
            merge_search_terms(&mut concept, &new_terms);
            concept.embedding = Some(Embedding::new(model_id.clone(), embedding_vec.clone()));
            concept.embedding_status = EmbeddingStatus::Compatible;
            concept.updated_at = Utc::now();
            tx.graph.upsert_concept(concept);
            tx.vector.upsert(&concept_id, &model_id, embedding_vec.clone());
            Ok(())
        })?;

        report.concepts_updated += 1;
        Ok(concept_id)
    }
}

fn merge_search_terms(concept: &mut Concept, new_terms: &[String]) {
    for term in new_terms {
        if !concept.search_terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
            concept.search_terms.push(term.clone());
        }
    }
}

fn dedup_case_insensitive(terms: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(terms.len());
    for term in terms {
        if !out.iter().any(|t: &String| t.eq_ignore_ascii_case(term)) {
            out.push(term.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnosis_providers::{InstanceCandidate, MockEmbeddingProvider, RelationshipCandidate};
    use gnosis_store::{EmbeddingConfig, StoreConfig};
    use gnosis_vocab::VocabConfig;

    fn test_engine() -> (UpsertEngine, Arc<Store>) {
        let store = Arc::new(Store::new(StoreConfig::default()).unwrap());
        store.insert_embedding_config(EmbeddingConfig {
            config_id: "cfg-1".to_string(),
            provider: "mock".to_string(),
            model_name: "token-hash-v1".to_string(),
            dimensions: 16,
            active: true,
            delete_protected: false,
            change_protected: false,
            created_at: Utc::now(),
        });
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new(16));
        let vocab = Arc::new(VocabRegistry::new(store.clone(), VocabConfig::default()));
        (UpsertEngine::new(store.clone(), embedder, vocab), store)
    }

    fn test_source(ontology: &str, text: &str) -> Source {
        Source {
            source_id: format!("{ontology}_src_0"),
            ontology: ontology.to_string(),
            document_label: "doc".to_string(),
            chunk_index: 0,
            full_text: text.to_string(),
            content_hash: gnosis_dsl::content_hash(text.as_bytes()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn creates_concepts_instances_and_relationships() {
        let (engine, store) = test_engine();
        let source = test_source("onto", "Acetaminophen inhibits COX enzymes in the liver.");
        store.with_tx(|tx| {
            tx.graph.insert_source(gnosis_store::Source {
                source_id: source.source_id.clone(),
                ontology: source.ontology.clone(),
                document_label: source.document_label.clone(),
                chunk_index: source.chunk_index,
                full_text: source.full_text.clone(),
                content_hash: source.content_hash.clone(),
                created_at: source.created_at,
            });
            Ok(())
        })
        .unwrap();

        let extraction = ExtractionResult {
            concepts: vec![
                ConceptCandidate { concept_id_suggestion: None, label: "Acetaminophen".into(), confidence: 0.9, search_terms: vec!["paracetamol".into()] },
                ConceptCandidate { concept_id_suggestion: None, label: "COX enzymes".into(), confidence: 0.9, search_terms: vec![] },
            ],
            instances: vec![InstanceCandidate { concept_id_suggestion: "Acetaminophen".into(), quote: "Acetaminophen inhibits COX enzymes".into() }],
            relationships: vec![RelationshipCandidate { from: "Acetaminophen".into(), to: "COX enzymes".into(), relationship_type: "inhibits".into(), confidence: 0.8 }],
        };

        let report = engine.apply(&extraction, &source, "onto", &[]).await.unwrap();
        assert_eq!(report.concepts_created, 2);
        assert_eq!(report.instances_created, 1);
        assert_eq!(report.relationships_created, 1);
    }

    #[tokio::test]
    async fn skips_instance_whose_quote_is_not_a_substring() {
        let (engine, store) = test_engine();
        let source = test_source("onto", "Plain text with nothing matching.");
        store.with_tx(|tx| {
            tx.graph.insert_source(gnosis_store::Source {
                source_id: source.source_id.clone(),
                ontology: source.ontology.clone(),
                document_label: source.document_label.clone(),
                chunk_index: source.chunk_index,
                full_text: source.full_text.clone(),
                content_hash: source.content_hash.clone(),
                created_at: source.created_at,
            });
            Ok(())
        })
        .unwrap();

        let extraction = ExtractionResult {
            concepts: vec![ConceptCandidate { concept_id_suggestion: None, label: "X".into(), confidence: 0.9, search_terms: vec![] }],
            instances: vec![InstanceCandidate { concept_id_suggestion: "X".into(), quote: "this quote was never said".into() }],
            relationships: vec![],
        };

        let report = engine.apply(&extraction, &source, "onto", &[]).await.unwrap();
        assert_eq!(report.instances_created, 0);
        assert_eq!(report.instances_skipped, 1);
    }

    #[tokio::test]
    async fn repeated_label_across_chunks_merges_into_one_concept() {
        let (engine, store) = test_engine();
        let source_a = test_source("onto", "Insulin lowers blood glucose.");
        let source_b = test_source("onto", "Insulin also promotes glycogen synthesis.");
        for s in [&source_a, &source_b] {
            store
                .with_tx(|tx| {
                    tx.graph.insert_source(gnosis_store::Source {
                        source_id: s.source_id.clone(),
                        ontology: s.ontology.clone(),
                        document_label: s.document_label.clone(),
                        chunk_index: s.chunk_index,
                        full_text: s.full_text.clone(),
                        content_hash: s.content_hash.clone(),
                        created_at: s.created_at,
                    });
                    Ok(())
                })
                .unwrap();
        }

        let extraction = |text: &str| ExtractionResult {
            concepts: vec![ConceptCandidate { concept_id_suggestion: None, label: "Insulin".into(), confidence: 0.9, search_terms: vec![] }],
            instances: vec![InstanceCandidate { concept_id_suggestion: "Insulin".into(), quote: text.to_string() }],
            relationships: vec![],
        };

        let r1 = engine.apply(&extraction("Insulin lowers blood glucose."), &source_a, "onto", &[]).await.unwrap();
        let r2 = engine.apply(&extraction("Insulin also promotes glycogen synthesis."), &source_b, "onto", &[]).await.unwrap();
        assert_eq!(r1.concepts_created, 1);
        assert_eq!(r2.concepts_created, 0);
        assert_eq!(r2.concepts_updated, 1);
        assert_eq!(store.concepts_in_ontology("onto").len(), 1);
    }
}
