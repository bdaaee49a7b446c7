use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::{AnimationSettings, Job, JobId, JobSpec, JobStats, JobStatus};

/// Request to queue one sprite for animation.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    /// Remote URL or data URI of the sprite.
    #[garde(length(min = 1))]
    pub image: String,

    #[garde(skip)]
    pub image_preview: Option<String>,

    #[garde(length(max = 255))]
    pub image_name: Option<String>,

    #[serde(default)]
    #[garde(custom(require_motion_prompt))]
    pub settings: AnimationSettings,
}

impl From<SubmitJobRequest> for JobSpec {
    fn from(req: SubmitJobRequest) -> Self {
        JobSpec {
            image: req.image,
            image_preview: req.image_preview,
            image_name: req.image_name,
            settings: req.settings,
        }
    }
}

/// Every job needs a motion description before it can be sent anywhere.
pub fn require_motion_prompt(settings: &AnimationSettings, _ctx: &()) -> garde::Result {
    match settings.get("motion_prompt").and_then(|v| v.as_str()) {
        Some(prompt) if !prompt.trim().is_empty() => Ok(()),
        _ => Err(garde::Error::new("motion_prompt is required")),
    }
}

/// Response after queueing a job.
#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Full queue snapshot.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub jobs: Vec<Job>,
    pub stats: JobStats,
    pub processing: bool,
}

/// Query for bulk removal.
#[derive(Debug, Default, Deserialize)]
pub struct ClearQuery {
    #[serde(default)]
    pub only_completed: bool,
}

/// Files written by a download request.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub files: Vec<String>,
}
