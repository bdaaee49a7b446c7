//! Headless batch runner: restores the persisted queue, runs every eligible
//! job once, saves finished spritesheets and exits.
//!
//! Ctrl-C cancels the batch after the job in flight.

use sprite_queue::{
    app_state::AppState,
    config::AppConfig,
    services::events::{EventKind, QueueEvent},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting sprite animation worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let state = AppState::init(&config)
        .await
        .expect("Failed to initialize worker state");

    state.store.on(EventKind::Update, |event| {
        if let QueueEvent::Update { stats, .. } = event {
            tracing::debug!(
                pending = stats.pending,
                processing = stats.processing,
                done = stats.done,
                errors = stats.errors,
                "Queue updated"
            );
        }
    });

    let processor = state.processor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after current job");
            processor.cancel_processing();
        }
    });

    let stats = state.store.get_stats().await;
    if stats.pending + stats.errors == 0 {
        tracing::info!(total = stats.total, "Nothing to process");
        return;
    }

    tracing::info!(eligible = stats.pending + stats.errors, "Worker ready, starting batch");
    let Some(stats) = state.processor.process_all().await else {
        return;
    };

    tracing::info!(done = stats.done, errors = stats.errors, "Batch finished");

    let jobs = state.store.get_all().await;
    match state.downloader.download_sheets(&jobs).await {
        Ok(files) => tracing::info!(
            count = files.len(),
            dir = %state.downloader.out_dir().display(),
            "Spritesheets downloaded"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to download spritesheets"),
    }

    if stats.errors > 0 {
        std::process::exit(1);
    }
}
