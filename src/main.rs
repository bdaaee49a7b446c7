use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sprite_queue::app_state::AppState;
use sprite_queue::config::AppConfig;
use sprite_queue::routes;
use sprite_queue::services::events::{EventKind, QueueEvent};

const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing sprite-queue server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    let state = AppState::init(&config)
        .await
        .expect("Failed to initialize application state");

    state.store.on(EventKind::JobComplete, |event| {
        if let QueueEvent::JobComplete(job) = event {
            tracing::info!(
                job_id = %job.id,
                motion_prompt = job.motion_prompt().unwrap_or_default(),
                "Completed animation"
            );
        }
    });
    state.store.on(EventKind::AllComplete, |event| {
        if let QueueEvent::AllComplete(stats) = event {
            tracing::info!(done = stats.done, errors = stats.errors, "All done");
        }
    });

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/jobs",
            get(routes::jobs::list_jobs)
                .post(routes::jobs::submit_job)
                .delete(routes::jobs::clear_jobs),
        )
        .route("/api/v1/jobs/upload", post(routes::jobs::upload_job))
        .route("/api/v1/jobs/{id}", delete(routes::jobs::remove_job))
        .route("/api/v1/jobs/{id}/settings", patch(routes::jobs::update_settings))
        .route("/api/v1/jobs/{id}/retry", post(routes::jobs::retry_job))
        .route("/api/v1/jobs/{id}/frames", post(routes::jobs::download_frames))
        .route("/api/v1/stats", get(routes::jobs::get_stats))
        .route("/api/v1/queue/process", post(routes::jobs::process_all))
        .route("/api/v1/queue/cancel", post(routes::jobs::cancel_processing))
        .route("/api/v1/results/download", post(routes::jobs::download_results))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)); // sprites arrive as data URIs

    tracing::info!("Starting sprite-queue on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
