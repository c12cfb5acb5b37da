//! Submission through completion: a job is submitted, approved, drained by
//! the scheduler, and its concepts/relationships land in the store.

use std::sync::Arc;

use gnosis_pipeline::{FsDocumentLoader, JobQueue, PipelineConfig, QueryService, Scheduler, UpsertEngine};
use gnosis_pipeline::worker::ExtractionWorker;
use gnosis_providers::{
    ConceptCandidate, EmbeddingProvider, ExtractionProvider, ExtractionResult, InstanceCandidate,
    MockEmbeddingProvider, RelationshipCandidate, ScriptedExtractionProvider,
};
use gnosis_store::{EmbeddingConfig, JobState, PayloadRef, Store, StoreConfig};
use gnosis_vocab::{VocabConfig, VocabRegistry};
use tempfile::NamedTempFile;

fn new_store_with_embedding_config() -> Arc<Store> {
    let store = Arc::new(Store::new(StoreConfig::default()).unwrap());
    store.insert_embedding_config(EmbeddingConfig {
        config_id: "cfg-1".to_string(),
        provider: "mock".to_string(),
        model_name: "token-hash-v1".to_string(),
        dimensions: 16,
        active: true,
        delete_protected: false,
        change_protected: false,
        created_at: chrono::Utc::now(),
    });
    store
}

#[tokio::test]
async fn submitted_approved_job_runs_to_completion() {
    let store = new_store_with_embedding_config();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new(16));
    let vocab = Arc::new(VocabRegistry::new(store.clone(), VocabConfig::default()));
    vocab.seed_builtins(embedder.as_ref()).await.unwrap();

    let document = "Willow bark contains salicin.\n\nSalicin is metabolized into salicylic acid.";
    let mut file = NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, document.as_bytes()).unwrap();
    let path = file.path().to_path_buf();

    let extractor: Arc<dyn ExtractionProvider> = Arc::new(ScriptedExtractionProvider::always(ExtractionResult {
        concepts: vec![
            ConceptCandidate { concept_id_suggestion: None, label: "Willow bark".into(), confidence: 0.9, search_terms: vec![] },
            ConceptCandidate { concept_id_suggestion: None, label: "Salicin".into(), confidence: 0.9, search_terms: vec![] },
        ],
        instances: vec![InstanceCandidate { concept_id_suggestion: "Willow bark".into(), quote: "Willow bark contains salicin".into() }],
        relationships: vec![RelationshipCandidate { from: "Willow bark".into(), to: "Salicin".into(), relationship_type: "contains".into(), confidence: 0.85 }],
    }));

    let upsert = Arc::new(UpsertEngine::new(store.clone(), embedder.clone(), vocab.clone()));
    let config = PipelineConfig { concurrency: 2, ..PipelineConfig::default() };
    let worker = Arc::new(ExtractionWorker::new(store.clone(), embedder.clone(), extractor, vocab.clone(), upsert, config.clone()));
    let queue = Arc::new(JobQueue::new(store.clone()));
    let loader = Arc::new(FsDocumentLoader::new());
    let scheduler = Arc::new(Scheduler::new(store.clone(), queue.clone(), worker.clone(), loader, config));

    let job = queue.submit(
        "alice".to_string(),
        "pharmacology".to_string(),
        PayloadRef { content_hash: gnosis_dsl::content_hash(document.as_bytes()), source_ref: path.to_string_lossy().to_string() },
        true,
    );
    assert_eq!(job.state, JobState::Pending);

    scheduler.analyze_once().await;
    let job = queue.get(job.job_id).unwrap();
    assert_eq!(job.state, JobState::Approved);
    assert_eq!(job.analysis.as_ref().unwrap().chunk_count, 1);

    let mut receiver = scheduler.subscribe(job.job_id);
    scheduler.drain_once().await;

    let finished = queue.get(job.job_id).unwrap();
    assert_eq!(finished.state, JobState::Completed);
    assert!(finished.progress.concepts_created >= 2);
    assert!(receiver.try_recv().is_ok());

    let query = QueryService::new(store.clone(), embedder);
    let hits = query.search_concepts("pharmacology", "salicin", 5, 0.0).await.unwrap();
    assert!(hits.iter().any(|m| m.concept.label == "Salicin"));
}
