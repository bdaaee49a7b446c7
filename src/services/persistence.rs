//! Durable key-value slot holding the queue snapshot.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::models::job::{Job, JobStatus};

/// Longest preview kept in a snapshot before it is cut down.
const PREVIEW_LIMIT: usize = 100;

/// A single durable slot addressed by a fixed key.
#[async_trait]
pub trait SnapshotSlot: Send + Sync {
    /// Read the stored blob, `None` when nothing was ever written.
    async fn load(&self) -> Result<Option<String>, PersistError>;

    /// Replace the stored blob.
    async fn save(&self, blob: &str) -> Result<(), PersistError>;

    /// Check the backing store is reachable (for health checks).
    async fn health_check(&self) -> Result<(), PersistError> {
        Ok(())
    }
}

/// Redis-backed slot.
pub struct RedisSlot {
    client: redis::Client,
    key: String,
}

impl RedisSlot {
    pub fn new(redis_url: &str, key: &str) -> Result<Self, PersistError> {
        let client = redis::Client::open(redis_url).map_err(PersistError::Redis)?;
        Ok(Self {
            client,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl SnapshotSlot for RedisSlot {
    async fn load(&self) -> Result<Option<String>, PersistError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(PersistError::Redis)?;
        let blob: Option<String> = conn.get(&self.key).await.map_err(PersistError::Redis)?;
        Ok(blob)
    }

    async fn save(&self, blob: &str) -> Result<(), PersistError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(PersistError::Redis)?;
        conn.set::<_, _, ()>(&self.key, blob)
            .await
            .map_err(PersistError::Redis)?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), PersistError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(PersistError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(PersistError::Redis)?;
        Ok(())
    }
}

/// Slot stored as a JSON file on local disk.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSlot for FileSlot {
    async fn load(&self) -> Result<Option<String>, PersistError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Io(e)),
        }
    }

    async fn save(&self, blob: &str) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so a crash never leaves a half-written snapshot.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Process-local slot. Used when no durable backend is configured and in tests.
#[derive(Default)]
pub struct MemorySlot {
    blob: Mutex<Option<String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    pub async fn contents(&self) -> Option<String> {
        self.blob.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotSlot for MemorySlot {
    async fn load(&self) -> Result<Option<String>, PersistError> {
        Ok(self.blob.lock().await.clone())
    }

    async fn save(&self, blob: &str) -> Result<(), PersistError> {
        *self.blob.lock().await = Some(blob.to_string());
        Ok(())
    }
}

/// Serialize the lightweight view of the queue, enforcing the size quota.
pub fn encode_snapshot(jobs: &[Job], max_bytes: usize) -> Result<String, PersistError> {
    let view: Vec<Job> = jobs.iter().map(lightweight).collect();
    let blob = serde_json::to_string(&view)?;
    if blob.len() > max_bytes {
        return Err(PersistError::QuotaExceeded {
            size: blob.len(),
            limit: max_bytes,
        });
    }
    Ok(blob)
}

/// Parse a stored snapshot. Jobs interrupted mid-run come back as pending.
pub fn decode_snapshot(blob: &str, max_bytes: usize) -> Result<Vec<Job>, PersistError> {
    if blob.len() > max_bytes {
        return Err(PersistError::QuotaExceeded {
            size: blob.len(),
            limit: max_bytes,
        });
    }
    let mut jobs: Vec<Job> = serde_json::from_str(blob)?;
    for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Processing) {
        job.reset_pending();
    }
    Ok(jobs)
}

fn lightweight(job: &Job) -> Job {
    let mut view = job.clone();
    if let Some((cut, _)) = view.image_preview.char_indices().nth(PREVIEW_LIMIT) {
        view.image_preview.truncate(cut);
        view.image_preview.push_str("...");
    }
    view
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Snapshot of {size} bytes exceeds the {limit} byte quota")]
    QuotaExceeded { size: usize, limit: usize },
}
