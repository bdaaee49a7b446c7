use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::models::animation::{AnimateParams, AnimationResult};

/// The remote operation that turns a sprite plus parameters into animation
/// artifacts. Implementations must return an error on any non-success
/// outcome.
#[async_trait]
pub trait Animator: Send + Sync {
    async fn animate(&self, params: &AnimateParams) -> Result<AnimationResult, AnimateError>;
}

/// Client for the Ludo.ai sprite animation endpoint.
pub struct LudoClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl LudoClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AnimateError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AnimateError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Animator for LudoClient {
    async fn animate(&self, params: &AnimateParams) -> Result<AnimationResult, AnimateError> {
        let url = format!("{}/assets/sprite/animate", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .json(params)
            .send()
            .await
            .map_err(AnimateError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(AnimateError::Http)?;

        if !status.is_success() {
            return Err(AnimateError::Api {
                status,
                message: api_error_message(status, &body),
            });
        }

        serde_json::from_str(&body).map_err(AnimateError::Parse)
    }
}

/// Pick the most useful message out of an error response body.
fn api_error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(Value::as_str))
        })
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("API Error ({})", status.as_u16()))
}

#[derive(Debug, thiserror::Error)]
pub enum AnimateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("Failed to parse animate response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid animation parameters: {0}")]
    InvalidParams(String),
}
