//! The seeded built-in relationship vocabulary (~30 entries). `support_weight`
//! follows the spec literally for the evidence pair (`SUPPORTS` = +1,
//! `CONTRADICTS` = -1) and extends it to the other epistemic verbs at a
//! proportionate signed weight; everything outside the epistemic category is
//! neutral (0), since "part of" or "precedes" carries no truth-convergence
//! signal on its own.

pub struct BuiltinType {
    pub name: &'static str,
    pub category: &'static str,
    pub support_weight: f64,
}

pub const BUILTIN_TYPES: &[BuiltinType] = &[
    // Epistemic — carries a signed evidence weight toward grounding.
    BuiltinType { name: "SUPPORTS", category: "epistemic", support_weight: 1.0 },
    BuiltinType { name: "CONTRADICTS", category: "epistemic", support_weight: -1.0 },
    BuiltinType { name: "CONFIRMS", category: "epistemic", support_weight: 1.0 },
    BuiltinType { name: "REFUTES", category: "epistemic", support_weight: -1.0 },
    BuiltinType { name: "VALIDATES", category: "epistemic", support_weight: 1.0 },
    BuiltinType { name: "INVALIDATES", category: "epistemic", support_weight: -1.0 },
    BuiltinType { name: "CORROBORATES", category: "epistemic", support_weight: 0.5 },
    BuiltinType { name: "UNDERMINES", category: "epistemic", support_weight: -0.5 },
    // General / similarity — neutral.
    BuiltinType { name: "RELATES_TO", category: "general", support_weight: 0.0 },
    BuiltinType { name: "ASSOCIATED_WITH", category: "general", support_weight: 0.0 },
    BuiltinType { name: "SIMILAR_TO", category: "general", support_weight: 0.0 },
    // Taxonomy — neutral.
    BuiltinType { name: "IS_A", category: "taxonomy", support_weight: 0.0 },
    BuiltinType { name: "PART_OF", category: "taxonomy", support_weight: 0.0 },
    BuiltinType { name: "HAS_PART", category: "taxonomy", support_weight: 0.0 },
    BuiltinType { name: "INSTANCE_OF", category: "taxonomy", support_weight: 0.0 },
    BuiltinType { name: "SUBCLASS_OF", category: "taxonomy", support_weight: 0.0 },
    // Causal — neutral (direction of cause is not a truth signal).
    BuiltinType { name: "CAUSES", category: "causal", support_weight: 0.0 },
    BuiltinType { name: "CAUSED_BY", category: "causal", support_weight: 0.0 },
    BuiltinType { name: "ENABLES", category: "causal", support_weight: 0.0 },
    BuiltinType { name: "PREVENTS", category: "causal", support_weight: 0.0 },
    // Dependency — neutral.
    BuiltinType { name: "REQUIRES", category: "dependency", support_weight: 0.0 },
    BuiltinType { name: "DEPENDS_ON", category: "dependency", support_weight: 0.0 },
    // Temporal — neutral.
    BuiltinType { name: "PRECEDES", category: "temporal", support_weight: 0.0 },
    BuiltinType { name: "FOLLOWS", category: "temporal", support_weight: 0.0 },
    // Spatial — neutral.
    BuiltinType { name: "LOCATED_IN", category: "spatial", support_weight: 0.0 },
    BuiltinType { name: "CONTAINS", category: "spatial", support_weight: 0.0 },
    // Provenance — neutral.
    BuiltinType { name: "DERIVED_FROM", category: "provenance", support_weight: 0.0 },
    // Functional — neutral.
    BuiltinType { name: "MEASURES", category: "functional", support_weight: 0.0 },
    BuiltinType { name: "USED_FOR", category: "functional", support_weight: 0.0 },
    BuiltinType { name: "PRODUCES", category: "functional", support_weight: 0.0 },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_names_are_unique_and_normalized() {
        let mut seen = HashSet::new();
        for b in BUILTIN_TYPES {
            assert!(seen.insert(b.name), "duplicate builtin {}", b.name);
            assert_eq!(b.name, b.name.to_uppercase());
            assert!(!b.name.contains(' '));
        }
    }

    #[test]
    fn support_contradicts_weights_match_spec() {
        let supports = BUILTIN_TYPES.iter().find(|b| b.name == "SUPPORTS").unwrap();
        let contradicts = BUILTIN_TYPES.iter().find(|b| b.name == "CONTRADICTS").unwrap();
        assert_eq!(supports.support_weight, 1.0);
        assert_eq!(contradicts.support_weight, -1.0);
    }
}
