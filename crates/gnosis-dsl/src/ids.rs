//! Deterministic id construction.
//!
//! Concept and relationship ids are derived rather than randomly generated
//! (unlike `Job`/`Instance` ids, which use `uuid::Uuid::new_v4` at their call
//! sites) so that re-ingesting the same source produces the same concept id
//! and the upsert engine can find the existing row instead of creating a
//! duplicate.

use crate::digest::fnv1a64_hex;

/// Lowercase, ASCII-hyphenated slug of a label: non-alphanumeric runs become
/// a single `-`, leading/trailing `-` are trimmed. Empty input slugs to `"x"`
/// so a concept id is never left with an empty segment.
pub fn slugify(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_was_sep = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('-');
            last_was_sep = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "x".to_string()
    } else {
        out
    }
}

/// Deterministic concept id: `{source_id}_{slug(label)}_{hash6}`, where
/// `hash6` is the first 6 hex digits of an FNV-1a digest over
/// `source_id|ontology_id|label` so that the same label from the same
/// source in the same ontology always resolves to the same id, while two
/// sources independently minting a concept with the same label do not
/// collide.
pub fn concept_id(source_id: &str, ontology_id: &str, label: &str) -> String {
    let slug = slugify(label);
    let hash = fnv1a64_hex(&format!("{source_id}|{ontology_id}|{label}"));
    format!("{source_id}_{slug}_{}", &hash[..6])
}

/// Deterministic relationship id: a content-addressed id over the
/// (subject, predicate, object, ontology) tuple, so re-extracting the same
/// triple from the same or a different source yields the same relationship
/// row and only its `support` accumulates evidence.
pub fn relationship_id(
    ontology_id: &str,
    subject_concept_id: &str,
    relationship_type: &str,
    object_concept_id: &str,
) -> String {
    let hash = fnv1a64_hex(&format!(
        "{ontology_id}|{subject_concept_id}|{relationship_type}|{object_concept_id}"
    ));
    format!("rel_{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_punctuation_and_case() {
        assert_eq!(slugify("Jet Engine"), "jet-engine");
        assert_eq!(slugify("  Turbo--Fan!! "), "turbo-fan");
        assert_eq!(slugify(""), "x");
        assert_eq!(slugify("???"), "x");
    }

    #[test]
    fn concept_id_is_deterministic_and_label_sensitive() {
        let a = concept_id("src_1", "ont_a", "Jet Engine");
        let b = concept_id("src_1", "ont_a", "Jet Engine");
        let c = concept_id("src_1", "ont_a", "Jet Engines");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("src_1_jet-engine_"));
    }

    #[test]
    fn concept_id_differs_by_source_and_ontology() {
        let a = concept_id("src_1", "ont_a", "Engine");
        let b = concept_id("src_2", "ont_a", "Engine");
        let c = concept_id("src_1", "ont_b", "Engine");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn relationship_id_is_order_sensitive() {
        let a = relationship_id("ont_a", "c1", "part_of", "c2");
        let b = relationship_id("ont_a", "c2", "part_of", "c1");
        assert_ne!(a, b);
        assert!(a.starts_with("rel_"));
    }

    use proptest::prelude::*;

    proptest! {
        /// `slugify` never panics on arbitrary text and always produces a
        /// non-empty, hyphen-bounded, lowercase-alphanumeric-or-hyphen slug.
        #[test]
        fn slugify_is_total_and_well_formed(label in ".{0,200}") {
            let slug = slugify(&label);
            prop_assert!(!slug.is_empty());
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        /// `concept_id` is a pure function of its inputs: same arguments,
        /// same id, every time.
        #[test]
        fn concept_id_is_deterministic_over_arbitrary_inputs(
            source in "[a-z0-9_]{1,20}",
            ontology in "[a-z0-9_]{1,20}",
            label in ".{0,100}",
        ) {
            prop_assert_eq!(concept_id(&source, &ontology, &label), concept_id(&source, &ontology, &label));
        }
    }
}
