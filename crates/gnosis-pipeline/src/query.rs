//! `QueryService`: the read-side facade over the store — semantic concept
//! search, concept detail, and graph traversal (`findConnection`,
//! `findRelated`), per §6.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use gnosis_providers::{EmbeddingProvider, EmbeddingRole};
use gnosis_store::{Concept, Instance, Relationship, Store};
use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;

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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMatch {
    pub concept: Concept,
    pub similarity: f32,
    /// Count of instances grounding this concept in source text.
    pub evidence_count: usize,
    /// The shortest instance quote, as a representative example (§6).
    pub sample_evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptDetail {
    pub concept: Concept,
    pub instances: Vec<Instance>,
    pub relationships: Vec<Relationship>,
}

/// A shortest path between two concepts: the node ids visited in order,
/// the relationship edges taken, and the hop count (`relationships.len()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPath {
    pub nodes: Vec<String>,
    pub relationships: Vec<Relationship>,
    pub hops: usize,
}

/// A concept reached during a `findRelated` walk: its distance in hops from
/// the origin and the relationship types traversed to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedConcept {
    pub concept_id: String,
    pub label: String,
    pub distance: usize,
    pub path_types: Vec<String>,
}

pub struct QueryService {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl QueryService {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Semantic search within `ontology`: embeds `query_text` with the
    /// `Query` role and ranks the ontology's concepts by cosine similarity,
    /// since the vector index itself is not ontology-partitioned. Only
    /// matches at or above `min_similarity` are returned (§6).
    pub async fn search_concepts(
        &self,
        ontology: &str,
        query_text: &str,
        limit: usize,
        min_similarity: f32,
    ) -> PipelineResult<Vec<ConceptMatch>> {
        let query_vector = self.embedder.embed(&[query_text.to_string()], EmbeddingRole::Query).await?.into_iter().next().unwrap_or_default();

        let mut matches: Vec<ConceptMatch> = self
            .store
            .concepts_in_ontology(ontology)
            .into_iter()
            .filter_map(|c| {
                let embedding = c.embedding.as_ref()?;
                let sim = cosine_similarity(&query_vector, &embedding.vector);
                if sim < min_similarity {
                    return None;
                }
                let mut instances = self.store.instances_for_concept(&c.concept_id);
                instances.sort_by_key(|i| i.quote.len());
                let sample_evidence = instances.first().map(|i| i.quote.clone());
                let evidence_count = instances.len();
                Some(ConceptMatch { concept: c, similarity: sim, evidence_count, sample_evidence })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.concept.concept_id.cmp(&b.concept.concept_id))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    pub fn get_concept(&self, concept_id: &str) -> Option<ConceptDetail> {
        let concept = self.store.get_concept(concept_id)?;
        let instances = self.store.instances_for_concept(concept_id);
        let relationships = self.store.relationships_touching(concept_id);
        Some(ConceptDetail { concept, instances, relationships })
    }

    /// Shortest relationship path (breadth-first, unweighted) from `from` to
    /// `to` within `ontology`, bounded to `max_hops` edges. `None` if no
    /// such path exists within the bound.
    pub fn find_connection(&self, ontology: &str, from: &str, to: &str, max_hops: usize) -> Option<ConnectionPath> {
        if from == to {
            return Some(ConnectionPath { nodes: vec![from.to_string()], relationships: Vec::new(), hops: 0 });
        }
        let mut visited: HashSet<String> = HashSet::from([from.to_string()]);
        let mut frontier: VecDeque<(String, Vec<Relationship>)> = VecDeque::from([(from.to_string(), Vec::new())]);

        for _ in 0..max_hops {
            let mut next: VecDeque<(String, Vec<Relationship>)> = VecDeque::new();
            while let Some((node, path)) = frontier.pop_front() {
                for edge in self.store.relationships_touching(&node) {
                    if edge.ontology != ontology {
                        continue;
                    }
                    let neighbor = if edge.from_concept_id == node { &edge.to_concept_id } else { &edge.from_concept_id };
                    if neighbor == to {
                        let mut full_path = path.clone();
                        full_path.push(edge);
                        return Some(Self::connection_path_from(from, full_path));
                    }
                    if visited.insert(neighbor.clone()) {
                        let mut extended = path.clone();
                        extended.push(edge);
                        next.push_back((neighbor.clone(), extended));
                    }
                }
            }
            if next.is_empty() {
                return None;
            }
            frontier = next;
        }
        None
    }

    fn connection_path_from(origin: &str, relationships: Vec<Relationship>) -> ConnectionPath {
        let mut nodes = vec![origin.to_string()];
        let mut cursor = origin.to_string();
        for edge in &relationships {
            cursor = if edge.from_concept_id == cursor { edge.to_concept_id.clone() } else { edge.from_concept_id.clone() };
            nodes.push(cursor.clone());
        }
        let hops = relationships.len();
        ConnectionPath { nodes, relationships, hops }
    }

    /// All concepts reachable from `concept_id` within `max_depth` edges,
    /// optionally restricted to one relationship type. Ordered by distance
    /// then id; `path_types` records the relationship types walked along
    /// the shortest path found to each concept.
    pub fn find_related(&self, concept_id: &str, relationship_type: Option<&str>, max_depth: usize) -> Vec<RelatedConcept> {
        let mut visited: HashSet<String> = HashSet::from([concept_id.to_string()]);
        let mut frontier: Vec<(String, Vec<String>)> = vec![(concept_id.to_string(), Vec::new())];
        let mut found: Vec<(usize, String, Vec<String>)> = Vec::new();

        for distance in 1..=max_depth {
            let mut next = Vec::new();
            for (node, path_types) in &frontier {
                for edge in self.store.relationships_touching(node) {
                    if let Some(t) = relationship_type {
                        if edge.relationship_type != t {
                            continue;
                        }
                    }
                    let neighbor = if edge.from_concept_id == *node { edge.to_concept_id.clone() } else { edge.from_concept_id.clone() };
                    if visited.insert(neighbor.clone()) {
                        let mut extended = path_types.clone();
                        extended.push(edge.relationship_type.clone());
                        found.push((distance, neighbor.clone(), extended.clone()));
                        next.push((neighbor, extended));
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        found
            .into_iter()
            .filter_map(|(distance, id, path_types)| {
                let concept = self.store.get_concept(&id)?;
                Some(RelatedConcept { concept_id: concept.concept_id, label: concept.label, distance, path_types })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gnosis_providers::MockEmbeddingProvider;
    use gnosis_store::StoreConfig;

    fn seed(store: &Store, ids: &[&str]) {
        for id in ids {
            store.with_tx(|tx| {
                tx.graph.upsert_concept(Concept::new(id.to_string(), id.to_string(), Utc::now()));
                Ok(())
            }).unwrap();
        }
    }

    #[test]
    fn find_connection_returns_shortest_path() {
        let store = Store::new(StoreConfig::default()).unwrap();
        seed(&store, &["a", "b", "c", "d"]);
        store.with_tx(|tx| {
            tx.graph.upsert_relationship("r1".into(), "onto".into(), "a".into(), "b".into(), "RELATES_TO".into(), 0.9)?;
            tx.graph.upsert_relationship("r2".into(), "onto".into(), "b".into(), "c".into(), "RELATES_TO".into(), 0.9)?;
            tx.graph.upsert_relationship("r3".into(), "onto".into(), "a".into(), "d".into(), "RELATES_TO".into(), 0.9)?;
            tx.graph.upsert_relationship("r4".into(), "onto".into(), "d".into(), "c".into(), "RELATES_TO".into(), 0.9)?;
            Ok(())
        })
        .unwrap();

        let service = QueryService::new(Arc::new(store), Arc::new(MockEmbeddingProvider::new(8)));
        let path = service.find_connection("onto", "a", "c", 3).unwrap();
        assert_eq!(path.hops, 2);
        assert_eq!(path.nodes, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(path.relationships.len(), 2);
    }

    #[test]
    fn find_connection_respects_hop_bound() {
        let store = Store::new(StoreConfig::default()).unwrap();
        seed(&store, &["a", "b", "c"]);
        store.with_tx(|tx| {
            tx.graph.upsert_relationship("r1".into(), "onto".into(), "a".into(), "b".into(), "RELATES_TO".into(), 0.9)?;
            tx.graph.upsert_relationship("r2".into(), "onto".into(), "b".into(), "c".into(), "RELATES_TO".into(), 0.9)?;
            Ok(())
        })
        .unwrap();

        let service = QueryService::new(Arc::new(store), Arc::new(MockEmbeddingProvider::new(8)));
        assert!(service.find_connection("onto", "a", "c", 1).is_none());
        assert!(service.find_connection("onto", "a", "c", 2).is_some());
    }

    #[test]
    fn find_related_filters_by_relationship_type() {
        let store = Store::new(StoreConfig::default()).unwrap();
        seed(&store, &["a", "b", "c"]);
        store.with_tx(|tx| {
            tx.graph.upsert_relationship("r1".into(), "onto".into(), "a".into(), "b".into(), "SUPPORTS".into(), 0.9)?;
            tx.graph.upsert_relationship("r2".into(), "onto".into(), "a".into(), "c".into(), "CONTRADICTS".into(), 0.9)?;
            Ok(())
        })
        .unwrap();

        let service = QueryService::new(Arc::new(store), Arc::new(MockEmbeddingProvider::new(8)));
        let related = service.find_related("a", Some("SUPPORTS"), 1);
        assert_eq!(related.iter().map(|c| c.concept_id.as_str()).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(related[0].distance, 1);
        assert_eq!(related[0].path_types, vec!["SUPPORTS".to_string()]);
    }
}
