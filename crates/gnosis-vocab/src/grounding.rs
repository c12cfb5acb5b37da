//! `GroundingCalculator`: a pure function of a concept's adjacent signed
//! edges, kept stateless (per the design notes) so it can be rebuilt from
//! scratch at any time for repair, not just invoked incrementally from the
//! `UpsertEngine`'s edge-change hooks.

use gnosis_store::Relationship;

use crate::registry::VocabRegistry;

/// `(numerator, denominator) -> grounding`, per the §4.6 formula:
/// `grounding = (numerator/denominator + 1) / 2` when `denominator > 0`,
/// `None` when `denominator == 0` (no signed evidence either way).
pub fn grounding_from_weighted_edges(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some((numerator / denominator + 1.0) / 2.0)
    } else {
        None
    }
}

/// Recompute grounding for the concept that `edges` (both directions) touch,
/// looking up each edge's signed `support_weight` in `registry`. Edges whose
/// type has since been removed from the registry (should not happen per P5,
/// but the computation stays pure and defensive) are skipped.
pub fn compute_grounding(registry: &VocabRegistry, edges: &[Relationship]) -> Option<f64> {
    let mut numerator = 0.0f64;
    let mut denominator = 0.0f64;
    for edge in edges {
        let Some(weight) = registry.support_weight_of(&edge.relationship_type) else {
            continue;
        };
        let signed = weight * edge.confidence;
        numerator += signed;
        denominator += signed.abs();
    }
    grounding_from_weighted_edges(numerator, denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnosis_store::{Store, StoreConfig};
    use std::sync::Arc;

    fn registry_with(types: &[(&str, f64)]) -> VocabRegistry {
        let store = Arc::new(Store::new(StoreConfig::default()).unwrap());
        for (name, weight) in types {
            store.insert_vocab_type(gnosis_store::VocabType {
                type_name: name.to_string(),
                category: "test".to_string(),
                support_weight: gnosis_store::SupportWeight(*weight),
                embedding: None,
                is_builtin: false,
                synonyms: Vec::new(),
                created_at: chrono::Utc::now(),
                usage_count: 0,
            });
        }
        VocabRegistry::new(store, crate::config::VocabConfig::default())
    }

    fn relationship(from: &str, to: &str, rel_type: &str, confidence: f64) -> Relationship {
        Relationship {
            relationship_id: format!("{from}-{rel_type}-{to}"),
            ontology: "test".to_string(),
            from_concept_id: from.to_string(),
            to_concept_id: to.to_string(),
            relationship_type: rel_type.to_string(),
            confidence,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn unanimous_support_grounds_to_one() {
        let registry = registry_with(&[("SUPPORTS", 1.0)]);
        let edges = vec![relationship("a", "b", "SUPPORTS", 0.8), relationship("c", "a", "SUPPORTS", 0.9)];
        assert_eq!(compute_grounding(&registry, &edges), Some(1.0));
    }

    #[test]
    fn unanimous_contradiction_grounds_to_zero() {
        let registry = registry_with(&[("CONTRADICTS", -1.0)]);
        let edges = vec![relationship("a", "b", "CONTRADICTS", 0.8)];
        assert_eq!(compute_grounding(&registry, &edges), Some(0.0));
    }

    #[test]
    fn balanced_evidence_grounds_to_one_half() {
        let registry = registry_with(&[("SUPPORTS", 1.0), ("CONTRADICTS", -1.0)]);
        let edges = vec![relationship("a", "b", "SUPPORTS", 0.5), relationship("c", "a", "CONTRADICTS", 0.5)];
        assert_eq!(compute_grounding(&registry, &edges), Some(0.5));
    }

    #[test]
    fn no_signed_edges_grounds_to_none() {
        let registry = registry_with(&[("RELATES_TO", 0.0)]);
        let edges = vec![relationship("a", "b", "RELATES_TO", 0.9)];
        assert_eq!(compute_grounding(&registry, &edges), None);
    }

    #[test]
    fn no_edges_at_all_grounds_to_none() {
        let registry = registry_with(&[]);
        assert_eq!(compute_grounding(&registry, &[]), None);
    }

    #[test]
    fn scenario_fresh_run_one_chunk_matches_spec_example() {
        // A --IS--> C with confidence 0.8 and support_weight +1 grounds both
        // endpoints to 0.9, per §8 scenario 1.
        let registry = registry_with(&[("IS", 1.0)]);
        let edges = vec![relationship("A", "C", "IS", 0.8)];
        let grounding = compute_grounding(&registry, &edges).unwrap();
        approx::assert_relative_eq!(grounding, 0.9, epsilon = 1e-9);
    }

    use proptest::prelude::*;

    proptest! {
        /// P4: whenever there is any signed evidence at all, grounding lands
        /// in `[0, 1]` regardless of how numerator/denominator balance.
        #[test]
        fn grounding_is_bounded_to_unit_interval(numerator in -100.0f64..100.0, denominator in 0.0001f64..100.0) {
            let numerator = numerator.clamp(-denominator, denominator);
            let grounding = grounding_from_weighted_edges(numerator, denominator).unwrap();
            prop_assert!((0.0..=1.0).contains(&grounding));
        }
    }
}
