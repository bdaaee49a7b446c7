//! Sequential execution of queued jobs against the animate operation.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::models::job::{JobId, JobStats, JobStatus};
use crate::services::animate::{AnimateError, Animator};
use crate::services::events::QueueEvent;
use crate::services::params::build_params;
use crate::services::queue::{ClaimPolicy, ClaimedJob, JobStore};

const GENERIC_FAILURE: &str = "Animation failed";

/// Batch bookkeeping. `epoch` identifies the current batch so a batch that
/// was cancelled can never resume once a newer one has started.
#[derive(Debug, Default)]
struct RunState {
    running: bool,
    epoch: u64,
}

/// Drives jobs through `pending -> processing -> done | error`, one at a time.
pub struct Processor {
    store: Arc<JobStore>,
    animator: Arc<dyn Animator>,
    state: Mutex<RunState>,
}

impl Processor {
    pub fn new(store: Arc<JobStore>, animator: Arc<dyn Animator>) -> Self {
        Self {
            store,
            animator,
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn is_processing(&self) -> bool {
        self.run_state().running
    }

    /// Run every job that is `pending` or `error` right now, in queue order.
    ///
    /// Returns `None` without doing anything if a batch is already running,
    /// otherwise the stats after the run. Jobs added during the run wait for
    /// the next one.
    pub async fn process_all(&self) -> Option<JobStats> {
        let Some(epoch) = self.begin_batch() else {
            tracing::debug!("Batch already running, ignoring request");
            return None;
        };
        self.store.notify().await;

        let batch = self.store.eligible_ids().await;
        tracing::info!(jobs = batch.len(), "Starting batch run");

        let mut processed = 0usize;
        for id in batch {
            if !self.batch_active(epoch) {
                tracing::info!(processed, "Batch cancelled");
                break;
            }
            // A concurrent single-job run may have taken or finished it already.
            if let Some(claimed) = self.store.claim(id, ClaimPolicy::Eligible).await {
                self.execute(claimed).await;
                processed += 1;
            }
        }

        self.end_batch(epoch);
        self.store.notify().await;

        let stats = self.store.get_stats().await;
        self.store.emit(&QueueEvent::AllComplete(stats));
        tracing::info!(
            processed,
            done = stats.done,
            errors = stats.errors,
            "Batch run finished"
        );
        Some(stats)
    }

    /// Run one job outside the batch loop. No-op if the job is unknown or
    /// already `processing`.
    pub async fn process_single(&self, id: JobId) -> Option<JobStatus> {
        let Some(claimed) = self.store.claim(id, ClaimPolicy::AnyIdle).await else {
            tracing::debug!(job_id = %id, "Job missing or already processing");
            return None;
        };
        self.execute(claimed).await
    }

    /// Stop the batch before its next job. The job in flight still finishes.
    ///
    /// The running flag clears immediately, so a new `process_all` may start
    /// while the cancelled batch's job is still in flight. The two animate
    /// calls then overlap; the claim keeps them on different jobs.
    pub fn cancel_processing(&self) {
        let mut state = self.run_state();
        if state.running {
            tracing::info!("Cancellation requested");
        }
        state.running = false;
    }

    /// Reset a failed job to `pending`. Does not start processing.
    pub async fn retry_job(&self, id: JobId) -> bool {
        self.store.retry_job(id).await
    }

    async fn execute(&self, claimed: ClaimedJob) -> Option<JobStatus> {
        tracing::info!(job_id = %claimed.id, "Processing animation job");
        let started = Instant::now();

        let outcome = match build_params(&claimed.image, &claimed.settings) {
            Ok(params) => self.animator.animate(&params).await,
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed();
        metrics::histogram!("sprite_animate_seconds").record(elapsed.as_secs_f64());

        let outcome = match outcome {
            Ok(result) => {
                metrics::counter!("sprite_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %claimed.id,
                    duration_ms = elapsed.as_millis() as u64,
                    spritesheet = %result.spritesheet_url,
                    "Animation complete"
                );
                Ok(result)
            }
            Err(e) => {
                metrics::counter!("sprite_jobs_failed_total").increment(1);
                tracing::warn!(
                    job_id = %claimed.id,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Animation failed"
                );
                Err(failure_message(&e))
            }
        };

        self.store.finish(claimed.id, outcome).await
    }

    fn begin_batch(&self) -> Option<u64> {
        let mut state = self.run_state();
        if state.running {
            return None;
        }
        state.running = true;
        state.epoch += 1;
        Some(state.epoch)
    }

    fn batch_active(&self, epoch: u64) -> bool {
        let state = self.run_state();
        state.running && state.epoch == epoch
    }

    fn end_batch(&self, epoch: u64) {
        let mut state = self.run_state();
        if state.epoch == epoch {
            state.running = false;
        }
    }

    fn run_state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn failure_message(error: &AnimateError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        message
    }
}
