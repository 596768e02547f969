//! # Metrics
//!
//! Prometheus export for the gateway, served at `GET /metrics`.
//!
//! **Counters:**
//! - `proxy_requests_total{outcome}` - Finished tasks by outcome
//! - `proxy_tokens_total{type}` - Prompt and completion tokens
//! - `proxy_admission_rejected_total` - Requests refused with 429
//!
//! **Gauges:**
//! - `proxy_queue_depth` - Tasks waiting for a worker
//! - `proxy_tasks_running` - Tasks talking to the backend
//!
//! **Histograms:**
//! - `proxy_task_duration_seconds` - Time from admission to completion

pub mod handler;

pub use metrics_exporter_prometheus::PrometheusBuilder;
use metrics_exporter_prometheus::PrometheusHandle;

/// Install the global Prometheus recorder with task-duration buckets.
pub fn setup_metrics() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::Matcher;

    let duration_buckets = &[
        0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("proxy_task_duration_seconds".to_string()),
            duration_buckets,
        )?
        .install_recorder()?;

    Ok(handle)
}

/// Handle for rendering metrics; falls back to a detached recorder when a
/// global one is already installed (several routers in one test binary).
pub fn metrics_handle() -> PrometheusHandle {
    setup_metrics().unwrap_or_else(|e| {
        tracing::debug!("Metrics already initialized, creating new handle: {}", e);
        PrometheusBuilder::new().build_recorder().handle()
    })
}
