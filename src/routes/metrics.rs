use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — Prometheus text exposition of the queue counters.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the queue emits.
pub fn describe_metrics() {
    metrics::describe_counter!("sprite_jobs_submitted_total", "Total animation jobs queued");
    metrics::describe_counter!("sprite_jobs_completed_total", "Total animation jobs completed");
    metrics::describe_counter!("sprite_jobs_failed_total", "Total animation jobs that failed");
    metrics::describe_counter!(
        "queue_persist_failures_total",
        "Queue snapshot saves or restores that failed"
    );
    metrics::describe_histogram!(
        "sprite_animate_seconds",
        "Duration of one animate call"
    );
    metrics::describe_gauge!("sprite_queue_pending", "Jobs currently waiting in the queue");
}
