//! `Scheduler`: bounded-concurrency FIFO dispatch over approved jobs, driving
//! `ExtractionWorker::execute` and fanning progress out over a `broadcast`
//! channel per job so a lagging subscriber drops the oldest events instead of
//! stalling the worker.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gnosis_store::{JobProgress, Store};
use tokio::sync::{broadcast, Semaphore};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::loader::DocumentLoader;
use crate::queue::JobQueue;
use crate::worker::ExtractionWorker;

pub struct Scheduler {
    store: Arc<Store>,
    queue: Arc<JobQueue>,
    worker: Arc<ExtractionWorker>,
    loader: Arc<dyn DocumentLoader>,
    config: PipelineConfig,
    semaphore: Arc<Semaphore>,
    cancellations: DashMap<Uuid, CancellationToken>,
    progress: DashMap<Uuid, broadcast::Sender<JobProgress>>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, queue: Arc<JobQueue>, worker: Arc<ExtractionWorker>, loader: Arc<dyn DocumentLoader>, config: PipelineConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            store,
            queue,
            worker,
            loader,
            config,
            semaphore,
            cancellations: DashMap::new(),
            progress: DashMap::new(),
        }
    }

    /// Subscribe to progress events for `job_id`. The channel is created
    /// lazily and lives until the next cleanup sweep drops it along with
    /// the job's other bookkeeping.
    pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobProgress> {
        self.progress
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.config.progress_channel_capacity).0)
            .subscribe()
    }

    /// Signal cooperative cancellation for a job currently in flight.
    /// Returns false if the job isn't (or is no longer) running here.
    pub fn request_cancel(&self, job_id: Uuid) -> bool {
        if let Some(token) = self.cancellations.get(&job_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Run the pure pre-flight estimate for every `Pending` job, carrying
    /// each on to `AwaitingApproval`/`Approved` (§2). Unlike `drain_once`
    /// this doesn't touch the semaphore — chunking a document for its word
    /// count is cheap and makes no provider calls, so it isn't subject to
    /// the same concurrency bound as actually running extraction.
    pub async fn analyze_once(&self) {
        while let Some(job) = self.queue.earliest_pending() {
            let outcome = async {
                let document_text = self.loader.load(&job.payload_ref.source_ref).await?;
                self.worker.analyze(&document_text)
            }
            .await;

            match outcome {
                Ok(analysis) => {
                    if self.queue.record_analysis(job.job_id, analysis).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %job.job_id, error = %e, "job analysis failed");
                    let _ = self.queue.finalize_failure(job.job_id, e.error_kind().to_string(), e.to_string());
                }
            }
        }
    }

    /// Drain the approved queue once: pick up to `concurrency` jobs FIFO by
    /// submission time and spawn each as its own task, returning once every
    /// spawned task finishes (success, failure, or cancellation). Call in a
    /// loop (or on a timer, see `spawn_loop`) to keep draining newly
    /// approved jobs. Requires `self` behind an `Arc` since each job runs
    /// as an independent `'static` task.
    pub async fn drain_once(self: &Arc<Self>) {
        let mut handles = Vec::new();
        loop {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else { break };
            let Some(job) = self.queue.earliest_approved() else {
                drop(permit);
                break;
            };
            // Mark Processing immediately so the same job isn't picked up
            // twice by a concurrent `drain_once` call before its task runs.
            if self.queue.begin_processing(job.job_id).is_err() {
                drop(permit);
                continue;
            }
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move { scheduler.run_job(job.job_id, permit).await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn run_job(self: Arc<Self>, job_id: Uuid, permit: tokio::sync::OwnedSemaphorePermit) {
        let _permit = permit;
        let job = match self.queue.get(job_id) {
            Some(j) => j,
            None => return,
        };

        let token = CancellationToken::new();
        self.cancellations.insert(job_id, token.clone());

        let outcome = async {
            let document_text = self.loader.load(&job.payload_ref.source_ref).await?;
            let sender = self.progress.entry(job_id).or_insert_with(|| broadcast::channel(self.config.progress_channel_capacity).0).clone();
            self.worker
                .execute(job_id, &document_text, &token, |p| {
                    let _ = sender.send(p);
                })
                .await
        }
        .await;

        self.cancellations.remove(&job_id);

        match outcome {
            Ok(_progress) => {
                let estimated = job.analysis.as_ref().map(|a| a.estimated_cost_usd).unwrap_or(0.0);
                let _ = self.queue.finalize_success(job_id, estimated);
            }
            Err(PipelineError::Cancelled) => {
                let _ = self.queue.cancel(job_id);
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "job failed");
                let _ = self.queue.finalize_failure(job_id, e.error_kind().to_string(), e.to_string());
            }
        }
    }

    /// Remove bookkeeping (progress channels, stray cancellation tokens)
    /// for jobs that finished and aged out of retention, and sweep the
    /// underlying terminal job rows themselves.
    pub fn cleanup(&self) -> usize {
        let removed = self.queue.sweep_terminal(self.config.terminal_retention);
        self.progress.retain(|job_id, _| self.store.get_job(*job_id).is_some());
        removed
    }
}

/// Runs `drain_once` on a fixed interval until cancelled via dropping the
/// returned `JoinHandle`'s owning task — the thin wrapper a CLI binary's
/// `main` actually spawns.
pub fn spawn_loop(scheduler: Arc<Scheduler>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            scheduler.drain_once().await;
            tokio::time::sleep(interval).await;
        }
    })
}
