//! Property-graph namespace: `Concept`, `Source`, `Instance`, `Relationship`
//! nodes/edges, kept as plain in-memory maps guarded by the Store's
//! transaction lock rather than the teacher's columnar `StrId` encoding —
//! this system's working set is concepts/relationships with rich typed
//! fields, not compact entity/attribute tuples, so a `HashMap<String, T>`
//! keyed directly by the already-deterministic ids is the right fit.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::types::{Concept, Instance, Relationship, Source};

#[derive(Default, Clone)]
pub struct GraphStore {
    concepts: HashMap<String, Concept>,
    sources: HashMap<String, Source>,
    instances: HashMap<Uuid, Instance>,
    relationships: HashMap<String, Relationship>,
    /// source_id -> concept_ids it APPEARS_IN-links to.
    source_concepts: HashMap<String, Vec<String>>,
    /// concept_id -> (incoming, outgoing) relationship ids, for grounding.
    concept_edges: HashMap<String, Vec<String>>,
    /// concept_id -> ontologies with a Source linking to it.
    concept_ontologies: HashMap<String, Vec<String>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Concepts ---------------------------------------------------------

    pub fn get_concept(&self, concept_id: &str) -> Option<&Concept> {
        self.concepts.get(concept_id)
    }

    pub fn upsert_concept(&mut self, concept: Concept) {
        self.concepts.insert(concept.concept_id.clone(), concept);
    }

    pub fn concepts_in_ontology(&self, ontology: &str) -> Vec<&Concept> {
        self.concept_ontologies
            .iter()
            .filter(|(_, ontologies)| ontologies.iter().any(|o| o == ontology))
            .filter_map(|(id, _)| self.concepts.get(id))
            .collect()
    }

    pub fn all_concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    /// Cascade-delete a concept: drops its instances, relationships, and
    /// source links. Returns an error if the concept does not exist.
    pub fn delete_concept(&mut self, concept_id: &str) -> StoreResult<()> {
        if self.concepts.remove(concept_id).is_none() {
            return Err(StoreError::NotFound(format!("concept {concept_id}")));
        }
        self.instances
            .retain(|_, i| i.from_concept_id != concept_id);
        self.relationships
            .retain(|_, r| r.from_concept_id != concept_id && r.to_concept_id != concept_id);
        for concepts in self.source_concepts.values_mut() {
            concepts.retain(|c| c != concept_id);
        }
        self.concept_edges.remove(concept_id);
        self.concept_ontologies.remove(concept_id);
        Ok(())
    }

    // -- Sources ------------------------------------------------------------

    pub fn get_source(&self, source_id: &str) -> Option<&Source> {
        self.sources.get(source_id)
    }

    pub fn insert_source(&mut self, source: Source) {
        self.sources.insert(source.source_id.clone(), source);
    }

    pub fn find_source_by_content_hash(&self, ontology: &str, content_hash: &str) -> Option<&Source> {
        self.sources
            .values()
            .find(|s| s.ontology == ontology && s.content_hash == content_hash)
    }

    /// Link a Source to a Concept (edge "APPEARS_IN"), idempotently.
    pub fn link_source(&mut self, source_id: &str, concept_id: &str) -> StoreResult<bool> {
        let ontology = self
            .sources
            .get(source_id)
            .map(|s| s.ontology.clone())
            .ok_or_else(|| StoreError::NotFound(format!("source {source_id}")))?;
        if !self.concepts.contains_key(concept_id) {
            return Err(StoreError::NotFound(format!("concept {concept_id}")));
        }

        let links = self.source_concepts.entry(source_id.to_string()).or_default();
        if links.iter().any(|c| c == concept_id) {
            return Ok(false);
        }
        links.push(concept_id.to_string());

        let ontologies = self
            .concept_ontologies
            .entry(concept_id.to_string())
            .or_default();
        if !ontologies.iter().any(|o| o == &ontology) {
            ontologies.push(ontology);
        }
        Ok(true)
    }

    pub fn all_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// Removes every source belonging to `ontology`, and any concept whose
    /// last source was one of them. Returns the ids of concepts deleted this
    /// way, so the caller can also drop their vector-index entries.
    pub fn cascade_delete_ontology(&mut self, ontology: &str) -> Vec<String> {
        let source_ids: Vec<String> = self
            .sources
            .values()
            .filter(|s| s.ontology == ontology)
            .map(|s| s.source_id.clone())
            .collect();
        let mut deleted_concepts = Vec::new();
        for source_id in source_ids {
            self.sources.remove(&source_id);
            if let Some(concept_ids) = self.source_concepts.remove(&source_id) {
                for concept_id in concept_ids {
                    if let Some(ontologies) = self.concept_ontologies.get_mut(&concept_id) {
                        ontologies.retain(|o| o != ontology);
                        if ontologies.is_empty() && self.delete_concept(&concept_id).is_ok() {
                            deleted_concepts.push(concept_id);
                        }
                    }
                }
            }
            self.instances.retain(|_, i| i.from_source_id != source_id);
        }
        deleted_concepts
    }

    // -- Instances ------------------------------------------------------------

    pub fn insert_instance(
        &mut self,
        quote: String,
        from_concept_id: String,
        from_source_id: String,
    ) -> StoreResult<Uuid> {
        if !self.concepts.contains_key(&from_concept_id) {
            return Err(StoreError::NotFound(format!("concept {from_concept_id}")));
        }
        if !self.sources.contains_key(&from_source_id) {
            return Err(StoreError::NotFound(format!("source {from_source_id}")));
        }
        let instance_id = Uuid::new_v4();
        self.instances.insert(
            instance_id,
            Instance {
                instance_id,
                quote,
                from_concept_id,
                from_source_id,
            },
        );
        Ok(instance_id)
    }

    pub fn instances_for_concept(&self, concept_id: &str) -> Vec<&Instance> {
        self.instances
            .values()
            .filter(|i| i.from_concept_id == concept_id)
            .collect()
    }

    pub fn all_instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    // -- Relationships --------------------------------------------------------

    pub fn get_relationship(&self, relationship_id: &str) -> Option<&Relationship> {
        self.relationships.get(relationship_id)
    }

    /// Upsert an edge `(from)-[type]->(to)`. On a pre-existing edge of the
    /// same `(from, to, type)`, averages confidence arithmetically rather
    /// than replacing it, per the tie-breaking policy.
    pub fn upsert_relationship(
        &mut self,
        relationship_id: String,
        ontology: String,
        from_concept_id: String,
        to_concept_id: String,
        relationship_type: String,
        confidence: f64,
    ) -> StoreResult<()> {
        if !self.concepts.contains_key(&from_concept_id) {
            return Err(StoreError::NotFound(format!("concept {from_concept_id}")));
        }
        if !self.concepts.contains_key(&to_concept_id) {
            return Err(StoreError::NotFound(format!("concept {to_concept_id}")));
        }

        let now = Utc::now();
        if let Some(existing) = self.relationships.get_mut(&relationship_id) {
            existing.confidence = (existing.confidence + confidence) / 2.0;
            existing.updated_at = now;
        } else {
            self.relationships.insert(
                relationship_id.clone(),
                Relationship {
                    relationship_id: relationship_id.clone(),
                    ontology,
                    from_concept_id: from_concept_id.clone(),
                    to_concept_id: to_concept_id.clone(),
                    relationship_type,
                    confidence,
                    created_at: now,
                    updated_at: now,
                },
            );
            self.concept_edges
                .entry(from_concept_id)
                .or_default()
                .push(relationship_id.clone());
            self.concept_edges
                .entry(to_concept_id)
                .or_default()
                .push(relationship_id);
        }
        Ok(())
    }

    /// All relationships touching `concept_id`, in either direction — the
    /// input to grounding recomputation.
    pub fn relationships_touching(&self, concept_id: &str) -> Vec<&Relationship> {
        self.concept_edges
            .get(concept_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.relationships.get(id))
            .collect()
    }

    pub fn all_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub fn delete_relationships_referencing(&mut self, type_name: &str, redirect_to: Option<&str>) {
        let ids: Vec<String> = self
            .relationships
            .iter()
            .filter(|(_, r)| r.relationship_type == type_name)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(new_type) = redirect_to {
                if let Some(r) = self.relationships.get_mut(&id) {
                    r.relationship_type = new_type.to_string();
                }
            } else {
                self.relationships.remove(&id);
            }
        }
    }
}
