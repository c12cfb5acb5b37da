//! Tunables for the pipeline crate: how many jobs run at once, how chunks
//! are sized, how large a context window extraction gets, and how long
//! terminal jobs stick around before the scheduler sweeps them.

use std::time::Duration;

use gnosis_ingest::ChunkerConfig;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded concurrency: at most this many jobs process at once (§5).
    pub concurrency: usize,
    pub chunker: ChunkerConfig,
    /// Up to this many of an ontology's existing concepts, ranked by cosine
    /// similarity to the current chunk, are handed to the extraction
    /// provider as context (§4.8).
    pub context_window_size: usize,
    /// Rough per-1000-token cost used only for the pre-flight cost
    /// estimate in `JobAnalysis`; not billed anywhere.
    pub cost_per_1k_tokens_usd: f64,
    /// Terminal jobs (`completed`/`failed`/`cancelled`) older than this are
    /// eligible for the scheduler's cleanup sweep.
    pub terminal_retention: Duration,
    /// Bounded progress-event channel capacity per job; a slow subscriber
    /// drops the oldest event rather than back-pressuring the worker.
    pub progress_channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            chunker: ChunkerConfig::default(),
            context_window_size: 50,
            cost_per_1k_tokens_usd: 0.0001,
            terminal_retention: Duration::from_secs(7 * 24 * 3600),
            progress_channel_capacity: 64,
        }
    }
}
