//! Ties `gnosis-store`, `gnosis-providers`, `gnosis-ingest` and
//! `gnosis-vocab` together into the ingestion pipeline: concept/relationship
//! upsert, chunk-by-chunk extraction, the job queue's approval workflow,
//! bounded-concurrency scheduling, and the read-side query facade.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod health;
pub mod loader;
pub mod query;
pub mod queue;
pub mod scheduler;
pub mod upsert;
pub mod worker;

pub use cancellation::CancellationToken;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use health::{check as check_health, HealthStatus};
pub use loader::{DocumentLoader, FsDocumentLoader};
pub use query::{ConceptDetail, ConceptMatch, ConnectionPath, QueryService, RelatedConcept};
pub use queue::JobQueue;
pub use scheduler::{spawn_loop, Scheduler};
pub use upsert::{UpsertEngine, UpsertReport};
pub use worker::ExtractionWorker;
