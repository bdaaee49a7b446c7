use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    animate::{AnimateError, LudoClient},
    download::ResultDownloader,
    persistence::{FileSlot, MemorySlot, PersistError, RedisSlot, SnapshotSlot},
    processor::Processor,
    queue::JobStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub processor: Arc<Processor>,
    pub slot: Arc<dyn SnapshotSlot>,
    pub downloader: Arc<ResultDownloader>,
}

impl AppState {
    pub fn new(processor: Processor, slot: Arc<dyn SnapshotSlot>, downloader: ResultDownloader) -> Self {
        Self {
            store: processor.store().clone(),
            processor: Arc::new(processor),
            slot,
            downloader: Arc::new(downloader),
        }
    }

    /// Wire up the slot, the restored store, the animate client and the
    /// processor from configuration.
    pub async fn init(config: &AppConfig) -> Result<Self, StartupError> {
        let slot = open_slot(config)?;
        let store = Arc::new(JobStore::restore(slot.clone(), config.snapshot_max_bytes).await);

        tracing::info!("Initializing Ludo.ai animate client");
        let animator = LudoClient::new(
            &config.ludo_base_url,
            &config.ludo_api_key,
            config.animate_timeout(),
        )?;

        let processor = Processor::new(store, Arc::new(animator));
        let downloader = ResultDownloader::new(&config.download_dir);
        Ok(Self::new(processor, slot, downloader))
    }
}

/// Redis when configured, then a snapshot file, then process memory.
pub fn open_slot(config: &AppConfig) -> Result<Arc<dyn SnapshotSlot>, PersistError> {
    if let Some(redis_url) = &config.redis_url {
        tracing::info!(key = %config.queue_storage_key, "Persisting queue to Redis");
        return Ok(Arc::new(RedisSlot::new(redis_url, &config.queue_storage_key)?));
    }
    if let Some(path) = &config.queue_snapshot_path {
        tracing::info!(path = %path.display(), "Persisting queue to file");
        return Ok(Arc::new(FileSlot::new(path)));
    }
    tracing::warn!("No persistence backend configured, queue will not survive restarts");
    Ok(Arc::new(MemorySlot::new()))
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Persistence setup failed: {0}")]
    Persist(#[from] PersistError),

    #[error("Animate client setup failed: {0}")]
    Animate(#[from] AnimateError),
}
