use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::animation::AnimationResult;

/// Job identifier, unique for the lifetime of a store.
pub type JobId = Uuid;

/// Open mapping of animation parameters (motion prompt, frames, model, ...).
/// The store never interprets it; it is translated into request parameters
/// only when the job runs.
pub type AnimationSettings = serde_json::Map<String, serde_json::Value>;

/// Status of an animation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    /// Whether a batch run picks the job up.
    pub fn is_eligible(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Error)
    }
}

/// Caller-supplied fields of a new job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    pub image: String,
    #[serde(default)]
    pub image_preview: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub settings: AnimationSettings,
}

/// One request to animate a single sprite with one set of settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Remote URL or data URI of the source sprite.
    pub image: String,
    pub image_preview: String,
    pub image_name: String,
    pub settings: AnimationSettings,
    pub status: JobStatus,
    pub result: Option<AnimationResult>,
    pub error: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        let image_preview = spec
            .image_preview
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| spec.image.clone());
        let image_name = spec
            .image_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        Self {
            id: Uuid::new_v4(),
            image: spec.image,
            image_preview,
            image_name,
            settings: spec.settings,
            status: JobStatus::Pending,
            result: None,
            error: None,
            added_at: Utc::now(),
        }
    }

    /// The motion description, if one was set.
    pub fn motion_prompt(&self) -> Option<&str> {
        self.settings.get("motion_prompt").and_then(|v| v.as_str())
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.result = None;
        self.error = None;
    }

    pub(crate) fn mark_done(&mut self, result: AnimationResult) {
        self.status = JobStatus::Done;
        self.result = Some(result);
        self.error = None;
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Error;
        self.result = None;
        self.error = Some(error);
    }

    pub(crate) fn reset_pending(&mut self) {
        self.status = JobStatus::Pending;
        self.result = None;
        self.error = None;
    }
}

/// Aggregate counts over the current queue.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub errors: usize,
}

impl JobStats {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Error => stats.errors += 1,
            }
        }
        stats
    }
}
