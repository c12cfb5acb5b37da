//! Shared identifiers, digests and small value types used across the Gnosis
//! crates: deterministic ids for concepts and relationships, content hashing
//! for source deduplication, and a handful of newtypes that would otherwise
//! be duplicated in every crate's data model.

pub mod digest;
pub mod ids;

pub use digest::{content_hash, fnv1a64_hex};
pub use ids::{concept_id, relationship_id, slugify};
