//! Gnosis CLI: a thin composition binary wiring `Store`, an embedding
//! provider, an extraction provider, `VocabRegistry` and `Scheduler`
//! together. Submit a document, approve/drain jobs, and query the graph —
//! everything heavier (retry policy, concurrency, grounding) lives in
//! `gnosis-pipeline` and `gnosis-vocab`; this binary only parses arguments
//! and prints results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gnosis_pipeline::{
    check_health, FsDocumentLoader, JobQueue, PipelineConfig, QueryService, Scheduler, UpsertEngine,
};
use gnosis_providers::{EmbeddingProvider, EmbeddingProviderConfig, ExtractionProvider, ExtractionResult, MockEmbeddingProvider, ScriptedExtractionProvider};
use gnosis_store::{EmbeddingConfig, JobState, PayloadRef, Store, StoreConfig};
use gnosis_vocab::{VocabConfig, VocabRegistry};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "gnosis")]
#[command(author, version, about = "Gnosis knowledge-graph ingestion pipeline")]
struct Cli {
    /// Path to the on-disk store snapshot; created on first use.
    #[arg(long, global = true, default_value = "gnosis.db")]
    db: PathBuf,
    /// Print query results as pretty-printed JSON instead of Rust debug form.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a document file for ingestion into an ontology.
    Ingest {
        file: PathBuf,
        #[arg(long)]
        ontology: String,
        #[arg(long, default_value = "cli")]
        owner: String,
        #[arg(long)]
        auto_approve: bool,
    },
    /// Inspect or act on jobs.
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Drain approved jobs once.
    Run,
    /// Read-side queries over the graph.
    Query {
        #[command(subcommand)]
        command: QueryCommands,
    },
    /// Print vocabulary/embedding-config health.
    Health,
    /// Inspect or administer the relationship-type vocabulary.
    Vocab {
        #[command(subcommand)]
        command: VocabCommands,
    },
    /// Inspect or administer embedding configs.
    Embeddings {
        #[command(subcommand)]
        command: EmbeddingCommands,
    },
    /// Administer whole ontologies.
    Ontology {
        #[command(subcommand)]
        command: OntologyCommands,
    },
}

#[derive(Subcommand)]
enum OntologyCommands {
    /// Delete every source in the ontology, cascading to concepts whose
    /// last remaining source was one of them.
    Delete { ontology: String },
}

#[derive(Subcommand)]
enum VocabCommands {
    /// List every relationship type currently in the registry.
    List,
    /// Redirect `a`'s edges onto `b` and retire `a` as a synonym.
    Merge { a: String, b: String, reason: String },
    /// Registry size, pressure zone, and per-category counts.
    Status,
    /// Re-embed every vocabulary type against the active embedder.
    RegenerateEmbeddings,
}

#[derive(Subcommand)]
enum EmbeddingCommands {
    /// List every registered embedding config.
    List,
    /// Register a new embedding config (inactive until `activate`d).
    Create {
        config_id: String,
        provider: String,
        model_name: String,
        dimensions: usize,
    },
    /// Make `config_id` the active config. Refused if it changes
    /// `dimensions` from the current active config, unless `--force`.
    Activate {
        config_id: String,
        #[arg(long)]
        force: bool,
    },
    Deactivate { config_id: String },
    /// Mark a config delete- and change-protected.
    Protect { config_id: String },
    /// Clear protection set by `protect`.
    Unprotect { config_id: String },
    /// Swap the in-process embedder over to `config_id` without restarting.
    HotReload { config_id: String },
}

#[derive(Subcommand)]
enum JobCommands {
    List {
        #[arg(long)]
        ontology: Option<String>,
    },
    Get {
        id: Uuid,
    },
    Approve {
        id: Uuid,
    },
    Cancel {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum QueryCommands {
    Search {
        ontology: String,
        text: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value_t = 0.0)]
        min_similarity: f32,
    },
    Get {
        concept_id: String,
    },
    Connect {
        ontology: String,
        from: String,
        to: String,
        #[arg(long, default_value_t = 4)]
        max_hops: usize,
    },
    Related {
        concept_id: String,
        #[arg(long)]
        relationship_type: Option<String>,
        #[arg(long, default_value_t = 1)]
        hops: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let store = Arc::new(Store::new(StoreConfig { snapshot_path: Some(cli.db.clone()), ..StoreConfig::default() }).context("opening store")?);
    if store.active_embedding_config().is_none() {
        store.insert_embedding_config(EmbeddingConfig {
            config_id: "default".to_string(),
            provider: "mock".to_string(),
            model_name: "token-hash-v1".to_string(),
            dimensions: 256,
            active: true,
            delete_protected: false,
            change_protected: false,
            created_at: chrono::Utc::now(),
        });
    }
    let dimensions = store.active_embedding_config().map(|c| c.dimensions).unwrap_or(256);

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new(dimensions));
    let vocab = Arc::new(VocabRegistry::new(store.clone(), VocabConfig::default()));
    let (seeded, expected) = vocab.seed_builtins(embedder.as_ref()).await?;
    if seeded < expected {
        tracing::warn!(seeded, expected, "vocabulary seeding incomplete");
    }

    // Placeholder extraction provider: a real deployment swaps this for an
    // LLM-backed `ExtractionProvider`; the pipeline itself is agnostic to
    // which one is plugged in here.
    let extractor: Arc<dyn ExtractionProvider> = Arc::new(ScriptedExtractionProvider::always(ExtractionResult::default()));

    let config = PipelineConfig::default();
    let upsert = Arc::new(UpsertEngine::new(store.clone(), embedder.clone(), vocab.clone()));
    let worker = Arc::new(gnosis_pipeline::ExtractionWorker::new(store.clone(), embedder.clone(), extractor, vocab.clone(), upsert, config.clone()));
    let queue = Arc::new(JobQueue::new(store.clone()));
    let loader = Arc::new(FsDocumentLoader::new());
    let scheduler = Arc::new(Scheduler::new(store.clone(), queue.clone(), worker.clone(), loader, config));

    match cli.command {
        Commands::Ingest { file, ontology, owner, auto_approve } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let job = queue.submit(
                owner,
                ontology,
                PayloadRef { content_hash: gnosis_dsl::content_hash(text.as_bytes()), source_ref: file.to_string_lossy().to_string() },
                auto_approve,
            );
            scheduler.analyze_once().await;
            let job = queue.get(job.job_id).unwrap_or(job);
            println!("{} {} ({:?})", "submitted job".green(), job.job_id, job.state);
        }
        Commands::Jobs { command } => match command {
            JobCommands::List { ontology } => {
                for job in queue.list(None, ontology.as_deref(), None, None, None) {
                    println!("{}  {:<16}  {}", job.job_id, format!("{:?}", job.state).yellow(), job.ontology);
                }
            }
            JobCommands::Get { id } => match queue.get(id) {
                Some(job) => println!("{:#?}", job),
                None => println!("{}", "no such job".red()),
            },
            JobCommands::Approve { id } => {
                let job = queue.approve(id)?;
                println!("{} {:?}", "approved".green(), job.state);
            }
            JobCommands::Cancel { id } => {
                scheduler.request_cancel(id);
                let job = queue.cancel(id)?;
                println!("{} {:?}", "cancelled".green(), job.state);
            }
        },
        Commands::Run => {
            scheduler.analyze_once().await;
            scheduler.drain_once().await;
            for job in queue.list(None, None, Some(JobState::Completed), None, None) {
                println!("{} {}", "completed".green(), job.job_id);
            }
        }
        Commands::Query { command } => match command {
            QueryCommands::Search { ontology, text, k, min_similarity } => {
                let query = QueryService::new(store.clone(), embedder.clone());
                for hit in query.search_concepts(&ontology, &text, k, min_similarity).await? {
                    println!(
                        "{:.3}  {}  {}  (evidence={}, grounding={:?})",
                        hit.similarity, hit.concept.concept_id, hit.concept.label, hit.evidence_count, hit.concept.grounding_strength
                    );
                }
            }
            QueryCommands::Get { concept_id } => {
                let query = QueryService::new(store.clone(), embedder.clone());
                match query.get_concept(&concept_id) {
                    Some(detail) if cli.json => println!("{}", serde_json::to_string_pretty(&detail)?),
                    Some(detail) => println!("{:#?}", detail),
                    None => println!("{}", "no such concept".red()),
                }
            }
            QueryCommands::Connect { ontology, from, to, max_hops } => {
                let query = QueryService::new(store.clone(), embedder.clone());
                match query.find_connection(&ontology, &from, &to, max_hops) {
                    Some(path) if cli.json => println!("{}", serde_json::to_string_pretty(&path)?),
                    Some(path) => println!("{:#?}", path),
                    None => println!("{}", "no connection within bound".red()),
                }
            }
            QueryCommands::Related { concept_id, relationship_type, hops } => {
                let query = QueryService::new(store.clone(), embedder.clone());
                for related in query.find_related(&concept_id, relationship_type.as_deref(), hops) {
                    println!("{}  {}  distance={}  via={:?}", related.concept_id, related.label, related.distance, related.path_types);
                }
            }
        },
        Commands::Vocab { command } => match command {
            VocabCommands::List => {
                for vt in store.all_vocab_types() {
                    println!(
                        "{:<20} {:<16} weight={:+.2} builtin={} synonyms={:?}",
                        vt.type_name, vt.category, vt.support_weight.0, vt.is_builtin, vt.synonyms
                    );
                }
            }
            VocabCommands::Merge { a, b, reason } => {
                vocab.merge(&a, &b, &reason)?;
                println!("{} {a} -> {b}", "merged".green());
            }
            VocabCommands::Status => {
                let status = vocab.status();
                println!("size={} zone={:?} aggressiveness={:.2}", status.size, status.zone, status.aggressiveness);
                for (category, count) in &status.categories {
                    println!("  {category}: {count}");
                }
            }
            VocabCommands::RegenerateEmbeddings => {
                let updated = vocab.reload_embeddings(embedder.as_ref()).await?;
                println!("{} {updated} vocabulary types", "re-embedded".green());
            }
        },
        Commands::Embeddings { command } => match command {
            EmbeddingCommands::List => {
                for cfg in store.list_embedding_configs() {
                    println!(
                        "{:<12} {:<10} {:<20} dims={} active={}",
                        cfg.config_id, cfg.provider, cfg.model_name, cfg.dimensions, cfg.active
                    );
                }
            }
            EmbeddingCommands::Create { config_id, provider, model_name, dimensions } => {
                store.insert_embedding_config(EmbeddingConfig {
                    config_id: config_id.clone(),
                    provider,
                    model_name,
                    dimensions,
                    active: false,
                    delete_protected: false,
                    change_protected: false,
                    created_at: chrono::Utc::now(),
                });
                println!("{} {config_id}", "created".green());
            }
            EmbeddingCommands::Activate { config_id, force } => {
                store.activate_embedding_config(&config_id, force)?;
                println!("{} {config_id}", "activated".green());
            }
            EmbeddingCommands::Deactivate { config_id } => {
                store.deactivate_embedding_config(&config_id)?;
                println!("{} {config_id}", "deactivated".green());
            }
            EmbeddingCommands::Protect { config_id } => {
                store.protect_embedding_config(&config_id)?;
                println!("{} {config_id}", "protected".green());
            }
            EmbeddingCommands::Unprotect { config_id } => {
                store.unprotect_embedding_config(&config_id)?;
                println!("{} {config_id}", "unprotected".green());
            }
            EmbeddingCommands::HotReload { config_id } => {
                let cfg = store.get_embedding_config(&config_id).with_context(|| format!("no such embedding config {config_id}"))?;
                embedder.reload(EmbeddingProviderConfig { provider: cfg.provider.clone(), model_name: cfg.model_name.clone(), dimensions: cfg.dimensions })?;
                vocab.reload_embeddings(embedder.as_ref()).await?;
                println!("{} embedder now using {config_id}", "hot-reloaded".green());
            }
        },
        Commands::Ontology { command } => match command {
            OntologyCommands::Delete { ontology } => {
                let removed = store.delete_ontology(&ontology)?;
                println!("{} {removed} concepts from '{ontology}'", "deleted".green());
            }
        },
        Commands::Health => {
            let status = check_health(&store, &vocab);
            if status.healthy {
                println!("{}", "healthy".green());
            } else {
                println!("{}", "degraded".red());
                for reason in &status.reasons {
                    println!("  - {reason}");
                }
            }
            println!("schema_version={} epoch={} vocabulary={}/{}", status.schema_version, status.epoch, status.vocabulary_size, status.vocabulary_expected);
        }
    }

    store.save().context("saving store")?;
    Ok(())
}
