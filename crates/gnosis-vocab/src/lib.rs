//! The relationship-type vocabulary: a bounded, self-extending registry with
//! embedding-based synonym merging and zone-based aggressiveness control
//! (`VocabRegistry`), plus the pure per-concept grounding computation
//! (`GroundingCalculator`) derived from signed supporting/contradicting
//! edges.

pub mod builtins;
pub mod config;
pub mod error;
pub mod grounding;
pub mod registry;
pub mod zone;

pub use config::VocabConfig;
pub use error::{VocabError, VocabResult};
pub use grounding::{compute_grounding, grounding_from_weighted_edges};
pub use registry::{normalize, RegistryStatus, ResolveOutcome, VocabRegistry};
pub use zone::{Zone, ZoneConfig};
