use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::animation::AnimationResult;
use crate::models::job::{AnimationSettings, Job, JobId, JobSpec, JobStats, JobStatus};
use crate::services::events::{EventBus, EventKind, QueueEvent};
use crate::services::persistence::{decode_snapshot, encode_snapshot, PersistError, SnapshotSlot};

/// What the processor needs to run a claimed job.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: JobId,
    pub image: String,
    pub settings: AnimationSettings,
}

/// Which jobs a claim may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPolicy {
    /// Batch runs only take jobs that are still `pending` or `error`.
    Eligible,
    /// Single-job runs take anything not already `processing`.
    AnyIdle,
}

/// Ordered, persisted collection of animation jobs.
///
/// Every mutation persists a snapshot to the slot and then fires `update`
/// before returning. Persistence faults are logged and counted, never
/// returned.
///
/// Mutations are serialized by `writer`, which is held across the slot
/// write. The `jobs` lock is released before the write, so a slow slot
/// delays other mutations but never reads.
pub struct JobStore {
    writer: Mutex<()>,
    jobs: Mutex<Vec<Job>>,
    slot: Arc<dyn SnapshotSlot>,
    events: EventBus,
    max_snapshot_bytes: usize,
}

impl JobStore {
    /// Empty store; nothing is read from the slot.
    pub fn new(slot: Arc<dyn SnapshotSlot>, max_snapshot_bytes: usize) -> Self {
        Self::with_jobs(Vec::new(), slot, max_snapshot_bytes)
    }

    /// Store seeded from whatever the slot holds. A missing, corrupt or
    /// oversized snapshot yields an empty queue.
    pub async fn restore(slot: Arc<dyn SnapshotSlot>, max_snapshot_bytes: usize) -> Self {
        let jobs = match slot.load().await {
            Ok(Some(blob)) => match decode_snapshot(&blob, max_snapshot_bytes) {
                Ok(jobs) => jobs,
                Err(e) => {
                    report_persist_failure("restore", &e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                report_persist_failure("restore", &e);
                Vec::new()
            }
        };

        tracing::info!(jobs = jobs.len(), "Restored queue snapshot");
        Self::with_jobs(jobs, slot, max_snapshot_bytes)
    }

    fn with_jobs(jobs: Vec<Job>, slot: Arc<dyn SnapshotSlot>, max_snapshot_bytes: usize) -> Self {
        Self {
            writer: Mutex::new(()),
            jobs: Mutex::new(jobs),
            slot,
            events: EventBus::new(),
            max_snapshot_bytes,
        }
    }

    /// Append a new pending job and return its id.
    pub async fn add_job(&self, spec: JobSpec) -> JobId {
        let job = Job::new(spec);
        let id = job.id;

        let _writer = self.writer.lock().await;
        let mut jobs = self.jobs.lock().await;
        jobs.push(job);
        metrics::counter!("sprite_jobs_submitted_total").increment(1);
        tracing::info!(job_id = %id, position = jobs.len(), "Job queued");

        self.commit(jobs).await;
        id
    }

    pub async fn remove_job(&self, id: JobId) {
        let _writer = self.writer.lock().await;
        let mut jobs = self.jobs.lock().await;
        jobs.retain(|j| j.id != id);
        self.commit(jobs).await;
    }

    /// Remove every job, or only the finished ones.
    pub async fn clear_jobs(&self, only_completed: bool) {
        let _writer = self.writer.lock().await;
        let mut jobs = self.jobs.lock().await;
        if only_completed {
            jobs.retain(|j| j.status != JobStatus::Done);
        } else {
            jobs.clear();
        }
        self.commit(jobs).await;
    }

    /// Merge `partial` into a job's settings. Unknown ids are ignored.
    pub async fn update_job_settings(&self, id: JobId, partial: AnimationSettings) {
        let _writer = self.writer.lock().await;
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return;
        };
        job.settings.extend(partial);
        self.commit(jobs).await;
    }

    /// Put a failed job back to `pending`. Returns whether anything changed.
    pub async fn retry_job(&self, id: JobId) -> bool {
        let _writer = self.writer.lock().await;
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Error)
        else {
            return false;
        };
        job.reset_pending();
        tracing::info!(job_id = %id, "Job reset for retry");
        self.commit(jobs).await;
        true
    }

    /// Copy of every job in queue order.
    pub async fn get_all(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn get_stats(&self) -> JobStats {
        JobStats::from_jobs(self.jobs.lock().await.iter())
    }

    /// Ids of batch-eligible jobs, in queue order.
    pub async fn eligible_ids(&self) -> Vec<JobId> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.status.is_eligible())
            .map(|j| j.id)
            .collect()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler);
    }

    pub(crate) fn emit(&self, event: &QueueEvent) {
        self.events.emit(event);
    }

    /// Fire `update` without mutating anything.
    pub async fn notify(&self) {
        let update = {
            let jobs = self.jobs.lock().await;
            QueueEvent::Update {
                jobs: jobs.clone(),
                stats: JobStats::from_jobs(jobs.iter()),
            }
        };
        self.emit_update(&update);
    }

    /// Atomically move a job to `processing`.
    ///
    /// This is the single exclusion point for every execution path: a job
    /// already `processing` can never be claimed a second time.
    pub(crate) async fn claim(&self, id: JobId, policy: ClaimPolicy) -> Option<ClaimedJob> {
        let _writer = self.writer.lock().await;
        let mut jobs = self.jobs.lock().await;
        let job = jobs.iter_mut().find(|j| j.id == id)?;

        let allowed = match policy {
            ClaimPolicy::Eligible => job.status.is_eligible(),
            ClaimPolicy::AnyIdle => job.status != JobStatus::Processing,
        };
        if !allowed {
            return None;
        }

        job.mark_processing();
        let claimed = ClaimedJob {
            id,
            image: job.image.clone(),
            settings: job.settings.clone(),
        };

        self.commit(jobs).await;
        Some(claimed)
    }

    /// Record the terminal state of a claimed job. Returns the new status,
    /// or `None` if the job was removed while it ran.
    pub(crate) async fn finish(
        &self,
        id: JobId,
        outcome: Result<AnimationResult, String>,
    ) -> Option<JobStatus> {
        let _writer = self.writer.lock().await;
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            tracing::debug!(job_id = %id, "Job removed while processing, dropping outcome");
            return None;
        };

        match outcome {
            Ok(result) => job.mark_done(result),
            Err(message) => job.mark_failed(message),
        }
        let status = job.status;

        if status == JobStatus::Done {
            let completed = job.clone();
            self.events.emit(&QueueEvent::JobComplete(completed));
        }

        self.commit(jobs).await;
        Some(status)
    }

    async fn commit(&self, jobs: MutexGuard<'_, Vec<Job>>) {
        let snapshot = encode_snapshot(&jobs, self.max_snapshot_bytes);
        let update = QueueEvent::Update {
            jobs: jobs.to_vec(),
            stats: JobStats::from_jobs(jobs.iter()),
        };
        drop(jobs);

        self.persist(snapshot).await;
        self.emit_update(&update);
    }

    async fn persist(&self, snapshot: Result<String, PersistError>) {
        let result = match snapshot {
            Ok(blob) => self.slot.save(&blob).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            report_persist_failure("save", &e);
        }
    }

    fn emit_update(&self, update: &QueueEvent) {
        if let QueueEvent::Update { stats, .. } = update {
            metrics::gauge!("sprite_queue_pending").set(stats.pending as f64);
        }
        self.events.emit(update);
    }
}

fn report_persist_failure(stage: &'static str, error: &PersistError) {
    metrics::counter!("queue_persist_failures_total", "stage" => stage).increment(1);
    tracing::warn!(stage, error = %error, "Queue persistence failed, continuing in memory");
}
