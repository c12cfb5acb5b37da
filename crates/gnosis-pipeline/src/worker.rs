//! `ExtractionWorker`: drives one job's chunks through the extraction
//! provider and the `UpsertEngine`, in two modes — `analyze` (pure,
//! no provider calls, feeds the pre-submission cost estimate) and
//! `execute` (the real run, restartable from `Job.progress.last_committed_chunk_index`).

use std::sync::Arc;
use std::time::Instant;

use gnosis_ingest::{Chunk, Chunker};
use gnosis_providers::{ContextConcept, EmbeddingProvider, EmbeddingRole, ExtractionProvider, ExtractionSchema};
use gnosis_store::{Job, JobAnalysis, JobProgress, Source, Store};
use gnosis_vocab::VocabRegistry;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::upsert::UpsertEngine;

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

pub struct ExtractionWorker {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn ExtractionProvider>,
    vocab: Arc<VocabRegistry>,
    upsert: Arc<UpsertEngine>,
    config: PipelineConfig,
}

impl ExtractionWorker {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn ExtractionProvider>,
        vocab: Arc<VocabRegistry>,
        upsert: Arc<UpsertEngine>,
        config: PipelineConfig,
    ) -> Self {
        Self { store, embedder, extractor, vocab, upsert, config }
    }

    /// Pure pre-flight estimate: chunk the document and project token count
    /// and cost, without calling either provider.
    pub fn analyze(&self, document_text: &str) -> PipelineResult<JobAnalysis> {
        let chunker = Chunker::new(self.config.chunker)?;
        let chunks = chunker.chunk(document_text)?;
        let total_words: usize = chunks.iter().map(|c| c.word_count).sum();
        // Rough words-to-tokens ratio; extraction prompts roughly double the
        // chunk text with schema and context, hence the factor beyond 1.3.
        let estimated_tokens = ((total_words as f64) * 1.3 * 2.0).round() as u64;
        let estimated_cost_usd = (estimated_tokens as f64 / 1000.0) * self.config.cost_per_1k_tokens_usd;
        Ok(JobAnalysis {
            chunk_count: chunks.len(),
            estimated_tokens,
            estimated_cost_usd,
        })
    }

    /// Run (or resume) extraction for `job_id` against `document_text`,
    /// checking `cancel` between chunks. Returns the progress reached; a
    /// cooperative cancellation surfaces as `PipelineError::Cancelled` after
    /// already-completed chunks have been persisted, so a restart resumes
    /// from `last_committed_chunk_index + 1`.
    pub async fn execute(
        &self,
        job_id: Uuid,
        document_text: &str,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(JobProgress),
    ) -> PipelineResult<JobProgress> {
        let mut job = self.store.get_job(job_id).ok_or(PipelineError::JobNotFound(job_id))?;
        let chunker = Chunker::new(self.config.chunker)?;
        let chunks = chunker.chunk(document_text)?;
        job.progress.chunks_total = chunks.len();

        let resume_from = job.progress.last_committed_chunk_index.map(|i| i + 1).unwrap_or(0);
        let started = Instant::now();
        let mut cancelled = false;

        for chunk in chunks.iter().skip(resume_from) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match self.process_chunk(&job, chunk).await {
                Ok(report) => {
                    job.progress.concepts_created += report.concepts_created;
                    job.progress.concepts_updated += report.concepts_updated;
                    job.progress.instances_created += report.instances_created;
                    job.progress.relationships_created += report.relationships_created + report.relationships_updated;
                }
                Err(e) if e.is_job_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, chunk = chunk.index, error = %e, "chunk extraction failed, skipping");
                    job.progress.failed_count += 1;
                }
            }

            job.progress.chunks_done += 1;
            job.progress.last_committed_chunk_index = Some(chunk.index);
            job.progress.elapsed_ms = started.elapsed().as_millis() as u64;
            job.progress.eta_ms = if job.progress.chunks_done == 0 {
                0
            } else {
                let per_chunk = job.progress.elapsed_ms as f64 / job.progress.chunks_done as f64;
                let remaining = job.progress.chunks_total.saturating_sub(job.progress.chunks_done);
                (per_chunk * remaining as f64).round() as u64
            };
            job.updated_at = chrono::Utc::now();
            self.store.update_job(job.clone());
            on_progress(job.progress.clone());
        }

        if cancelled {
            return Err(PipelineError::Cancelled);
        }
        Ok(job.progress)
    }

    async fn process_chunk(&self, job: &Job, chunk: &Chunk) -> PipelineResult<crate::upsert::UpsertReport> {
        let chunk_vector = self
            .embedder
            .embed(&[chunk.text.clone()], EmbeddingRole::Query)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut ranked: Vec<(ContextConcept, f32)> = self
            .store
            .concepts_in_ontology(&job.ontology)
            .into_iter()
            .filter_map(|c| {
                let embedding = c.embedding.as_ref()?;
                if c.embedding_status != gnosis_store::EmbeddingStatus::Compatible {
                    return None;
                }
                let sim = cosine_similarity(&chunk_vector, &embedding.vector);
                Some((
                    ContextConcept { concept_id: c.concept_id.clone(), label: c.label.clone(), search_terms: c.search_terms.clone() },
                    sim,
                ))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.concept_id.cmp(&b.0.concept_id)));
        ranked.truncate(self.config.context_window_size);
        let context_ids: Vec<String> = ranked.iter().map(|(c, _)| c.concept_id.clone()).collect();
        let context_concepts: Vec<ContextConcept> = ranked.into_iter().map(|(c, _)| c).collect();

        let schema = ExtractionSchema { known_relationship_types: self.vocab.snapshot().keys().cloned().collect() };
        let extraction = self.extractor.extract(&chunk.text, &context_concepts, &schema).await?;

        let source = Source {
            source_id: format!("{job_id}_c{index}", job_id = job.job_id, index = chunk.index),
            ontology: job.ontology.clone(),
            document_label: job.payload_ref.source_ref.clone(),
            chunk_index: chunk.index,
            full_text: chunk.text.clone(),
            content_hash: gnosis_dsl::content_hash(chunk.text.as_bytes()),
            created_at: chrono::Utc::now(),
        };
        self.store.with_tx(|tx| {
            tx.graph.insert_source(source.clone());
            Ok(())
        })?;

        Ok(self.upsert.apply(&extraction, &source, &job.ontology, &context_ids).await?)
    }
}
