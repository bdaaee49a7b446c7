use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Ludo.ai API key
    pub ludo_api_key: String,

    /// Ludo.ai API base URL
    #[serde(default = "default_ludo_base_url")]
    pub ludo_base_url: String,

    /// Timeout for a single animate request, in seconds
    #[serde(default = "default_animate_timeout_secs")]
    pub animate_timeout_secs: u64,

    /// Redis connection string. Takes precedence over the snapshot file.
    pub redis_url: Option<String>,

    /// Path of the JSON snapshot file, used when Redis is not configured
    pub queue_snapshot_path: Option<PathBuf>,

    /// Fixed key the queue snapshot is stored under
    #[serde(default = "default_storage_key")]
    pub queue_storage_key: String,

    /// Largest snapshot (in bytes) the slot will accept
    #[serde(default = "default_snapshot_max_bytes")]
    pub snapshot_max_bytes: usize,

    /// Where downloaded spritesheets and frames are written
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_ludo_base_url() -> String {
    "https://api.ludo.ai/api".to_string()
}

fn default_animate_timeout_secs() -> u64 {
    600
}

fn default_storage_key() -> String {
    "sprite_queue:jobs".to_string()
}

fn default_snapshot_max_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn animate_timeout(&self) -> Duration {
        Duration::from_secs(self.animate_timeout_secs)
    }
}
