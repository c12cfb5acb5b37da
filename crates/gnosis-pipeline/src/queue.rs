//! `JobQueue`: submission, the approval-workflow state machine, and
//! duplicate detection by `(content_hash, ontology)` (P9). Owns no
//! concurrency of its own — all state lives in the `Store`, which already
//! serializes writes behind its single lock; this type just encodes which
//! transitions are legal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gnosis_store::{Job, JobAnalysis, JobError, JobResult, JobState, PayloadRef, Store};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

pub struct JobQueue {
    store: Arc<Store>,
}

impl JobQueue {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Submit a document for ingestion. If an active (non-terminal) job
    /// already exists for the same `(content_hash, ontology)`, that job is
    /// returned instead of creating a duplicate (P9) — re-submitting the
    /// same document while it is still pending/processing is a no-op from
    /// the caller's point of view. The new job starts `Pending`, with no
    /// cost/token estimate yet; `record_analysis` carries it on to
    /// `AwaitingApproval`/`Approved` once the scheduler's analysis pass has
    /// chunked the document and projected a cost (§2, §6).
    pub fn submit(&self, owner: String, ontology: String, payload: PayloadRef, auto_approve: bool) -> Job {
        if let Some(existing) = self.store.find_active_job_by_payload(&payload.content_hash, &ontology) {
            return existing;
        }

        let now = Utc::now();
        let job = Job {
            job_id: Uuid::new_v4(),
            state: JobState::Pending,
            owner,
            ontology,
            payload_ref: payload,
            analysis: None,
            progress: Default::default(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            auto_approve,
        };
        self.store.insert_job(job.clone());
        job
    }

    /// Attach the pre-flight `analysis` to a `Pending` job and advance it to
    /// `AwaitingApproval`, or straight to `Approved` if it was submitted
    /// with `auto_approve`.
    pub fn record_analysis(&self, job_id: Uuid, analysis: JobAnalysis) -> PipelineResult<Job> {
        let mut job = self.store.get_job(job_id).ok_or(PipelineError::JobNotFound(job_id))?;
        let next = if job.auto_approve { JobState::Approved } else { JobState::AwaitingApproval };
        if !Self::allowed(job.state, next) {
            return Err(PipelineError::InvalidTransition { from: job.state, to: next });
        }
        job.analysis = Some(analysis);
        job.state = next;
        job.updated_at = Utc::now();
        self.store.update_job(job.clone());
        Ok(job)
    }

    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.store.get_job(job_id)
    }

    pub fn list(
        &self,
        owner: Option<&str>,
        ontology: Option<&str>,
        state: Option<JobState>,
        since: Option<chrono::DateTime<Utc>>,
        until: Option<chrono::DateTime<Utc>>,
    ) -> Vec<Job> {
        self.store.list_jobs(owner, ontology, state, since, until)
    }

    pub fn earliest_approved(&self) -> Option<Job> {
        self.store.earliest_approved_job()
    }

    pub fn earliest_pending(&self) -> Option<Job> {
        self.store.earliest_pending_job()
    }

    /// `AwaitingApproval -> Approved` only. The generic transition table
    /// also allows `Pending -> Approved` for `record_analysis`'s internal
    /// auto-approve path, so this checks the current state explicitly
    /// rather than going through `transition` — an operator calling
    /// `approve` on a job that hasn't finished analysis yet must be
    /// rejected, not silently fast-forwarded (§4.9).
    pub fn approve(&self, job_id: Uuid) -> PipelineResult<Job> {
        let job = self.store.get_job(job_id).ok_or(PipelineError::JobNotFound(job_id))?;
        if job.state != JobState::AwaitingApproval {
            return Err(PipelineError::InvalidTransition { from: job.state, to: JobState::Approved });
        }
        self.transition(job_id, JobState::Approved)
    }

    /// Cancel from any non-terminal state. A job already `Processing` is
    /// flagged here; the scheduler's cooperative check is what actually
    /// stops the worker between chunks and lands it in `Cancelled`.
    pub fn cancel(&self, job_id: Uuid) -> PipelineResult<Job> {
        self.transition(job_id, JobState::Cancelled)
    }

    pub fn begin_processing(&self, job_id: Uuid) -> PipelineResult<Job> {
        self.transition(job_id, JobState::Processing)
    }

    pub fn finalize_success(&self, job_id: Uuid, cost_actual_usd: f64) -> PipelineResult<Job> {
        let mut job = self.transition(job_id, JobState::Completed)?;
        job.result = Some(JobResult { cost_actual_usd });
        self.store.update_job(job.clone());
        Ok(job)
    }

    pub fn finalize_failure(&self, job_id: Uuid, error_kind: String, message: String) -> PipelineResult<Job> {
        let last_successful_chunk = self.store.get_job(job_id).and_then(|j| j.progress.last_committed_chunk_index);
        let mut job = self.transition(job_id, JobState::Failed)?;
        job.error = Some(JobError { error_kind, message, last_successful_chunk });
        self.store.update_job(job.clone());
        Ok(job)
    }

    pub fn delete(&self, job_id: Uuid) -> PipelineResult<()> {
        self.store.delete_job(job_id).map_err(PipelineError::from)
    }

    /// Sweep terminal jobs older than the retention window; returns how
    /// many were removed.
    pub fn sweep_terminal(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        self.store.sweep_terminal_jobs_older_than(cutoff)
    }

    fn transition(&self, job_id: Uuid, to: JobState) -> PipelineResult<Job> {
        let mut job = self.store.get_job(job_id).ok_or(PipelineError::JobNotFound(job_id))?;
        if !Self::allowed(job.state, to) {
            return Err(PipelineError::InvalidTransition { from: job.state, to });
        }
        job.state = to;
        job.updated_at = Utc::now();
        self.store.update_job(job.clone());
        Ok(job)
    }

    fn allowed(from: JobState, to: JobState) -> bool {
        use JobState::*;
        if from.is_terminal() {
            return false;
        }
        matches!(
            (from, to),
            (Pending, AwaitingApproval)
                | (Pending, Approved)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (AwaitingApproval, Approved)
                | (AwaitingApproval, Cancelled)
                | (Approved, Processing)
                | (Approved, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnosis_store::StoreConfig;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(Store::new(StoreConfig::default()).unwrap()))
    }

    fn payload(hash: &str) -> PayloadRef {
        PayloadRef { content_hash: hash.to_string(), source_ref: "doc.txt".to_string() }
    }

    #[test]
    fn resubmitting_same_payload_returns_existing_job() {
        let q = queue();
        let a = q.submit("alice".into(), "onto".into(), payload("hash1"), false);
        let b = q.submit("alice".into(), "onto".into(), payload("hash1"), false);
        assert_eq!(a.job_id, b.job_id);
    }

    #[test]
    fn submission_starts_pending_until_analysis_lands() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash-pending"), false);
        assert_eq!(job.state, JobState::Pending);
        assert!(job.analysis.is_none());
    }

    #[test]
    fn approve_is_rejected_before_analysis_lands() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash-pre-analysis"), false);
        let err = q.approve(job.job_id).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { from: JobState::Pending, .. }));
    }

    #[test]
    fn auto_approve_skips_awaiting_approval() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash2"), true);
        let job = q.record_analysis(job.job_id, JobAnalysis::default()).unwrap();
        assert_eq!(job.state, JobState::Approved);
    }

    #[test]
    fn without_auto_approve_analysis_lands_in_awaiting_approval() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash2b"), false);
        let job = q.record_analysis(job.job_id, JobAnalysis::default()).unwrap();
        assert_eq!(job.state, JobState::AwaitingApproval);
    }

    #[test]
    fn cannot_approve_a_job_already_processing() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash3"), true);
        let job = q.record_analysis(job.job_id, JobAnalysis::default()).unwrap();
        q.begin_processing(job.job_id).unwrap();
        let err = q.approve(job.job_id).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    }

    #[test]
    fn cannot_transition_out_of_a_terminal_state() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash4"), true);
        let job = q.record_analysis(job.job_id, JobAnalysis::default()).unwrap();
        q.begin_processing(job.job_id).unwrap();
        q.finalize_success(job.job_id, 0.01).unwrap();
        assert!(q.cancel(job.job_id).is_err());
    }

    #[test]
    fn resubmitting_after_completion_creates_a_new_job() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash5"), true);
        let job = q.record_analysis(job.job_id, JobAnalysis::default()).unwrap();
        q.begin_processing(job.job_id).unwrap();
        q.finalize_success(job.job_id, 0.01).unwrap();
        let resubmitted = q.submit("alice".into(), "onto".into(), payload("hash5"), true);
        assert_ne!(job.job_id, resubmitted.job_id);
    }

    #[test]
    fn a_pending_job_can_be_cancelled_before_analysis() {
        let q = queue();
        let job = q.submit("alice".into(), "onto".into(), payload("hash6"), false);
        let job = q.cancel(job.job_id).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }
}
