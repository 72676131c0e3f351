use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the worker's metrics.
pub fn describe() {
    metrics::describe_counter!(
        "extraction_jobs_total",
        "Deliveries concluded, labelled by acknowledgment decision"
    );
    metrics::describe_counter!(
        "extraction_stage_failures_total",
        "Jobs rejected, labelled by the stage that failed"
    );
    metrics::describe_counter!(
        "extraction_index_failures_total",
        "Search index updates that failed after the extract was stored"
    );
    metrics::describe_histogram!(
        "extraction_job_seconds",
        "Time to run one job through the pipeline"
    );
    metrics::describe_gauge!(
        "extraction_queue_depth",
        "Jobs waiting in the queue at the last health check"
    );
}
