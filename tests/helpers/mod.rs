//! Test helpers: a scripted animate operation and job builders.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

use sprite_queue::models::animation::{AnimateParams, AnimationResult};
use sprite_queue::models::job::{AnimationSettings, JobSpec};
use sprite_queue::services::animate::{AnimateError, Animator};

/// Lets a test hold an animate call open until it says so.
pub struct Gate {
    pub started: Notify,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    /// Let exactly one held call through.
    pub fn step(&self) {
        self.release.add_permits(1);
    }

    pub fn open(&self) {
        self.release.add_permits(1024);
    }
}

/// Animator that succeeds unless the motion prompt is listed as failing.
#[derive(Default)]
pub struct MockAnimator {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    failing: HashSet<String>,
    gate: Option<Arc<Gate>>,
}

impl MockAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, prompt: &str) -> Self {
        self.failing.insert(prompt.to_string());
        self
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Animator for MockAnimator {
    async fn animate(&self, params: &AnimateParams) -> Result<AnimationResult, AnimateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(params.motion_prompt.clone());

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }

        if self.failing.contains(&params.motion_prompt) {
            return Err(AnimateError::Api {
                status: reqwest::StatusCode::BAD_REQUEST,
                message: format!("cannot animate '{}'", params.motion_prompt),
            });
        }

        Ok(serde_json::from_value(json!({
            "spritesheet_url": format!("https://cdn.example.com/{}.png", params.motion_prompt),
            "num_cols": 2,
            "num_rows": 2,
            "num_frames": 4,
        }))
        .unwrap())
    }
}

pub fn settings(value: Value) -> AnimationSettings {
    value.as_object().cloned().expect("settings must be a JSON object")
}

pub fn job_spec(prompt: &str) -> JobSpec {
    JobSpec {
        image: "https://example.com/sprite.png".to_string(),
        image_preview: None,
        image_name: Some(format!("{prompt}.png")),
        settings: settings(json!({ "motion_prompt": prompt, "frames": "4" })),
    }
}
