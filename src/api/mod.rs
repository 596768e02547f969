//! # API Gateway
//!
//! OpenAI-compatible HTTP endpoints in front of the task queue.
//!
//! ## Endpoints
//!
//! - `GET /` - Plaintext usage stats
//! - `GET /<ns>/v1/models` - The configured backend model
//! - `POST /<ns>/v1/chat/completions` - Chat completion, JSON or SSE
//! - `GET /metrics` - Prometheus metrics
//!
//! `<ns>` is `server.namespace` (default `commandr`).
//!
//! ## Example
//!
//! ```no_run
//! use commandr::api::{create_router, AppState};
//! use commandr::config::ProxyConfig;
//! use commandr::queue::{AggregateStats, TaskQueue};
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(ProxyConfig::default());
//! let stats = Arc::new(AggregateStats::new());
//! let queue = Arc::new(TaskQueue::new(config.queue.clone(), Arc::clone(&stats)));
//!
//! let app = create_router(Arc::new(AppState::new(config, queue, stats)));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:7860").await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Admission and capacity errors use the OpenAI error envelope with 429 or
//! 503. Generation failures are delivered as ordinary completions whose
//! content describes the error, so chat frontends display them.

mod completions;
mod models;
pub mod relay;
mod stats;
pub mod types;

pub use models::{ModelObject, ModelsResponse};
pub use relay::ResponseFrames;
pub use types::*;

use crate::config::ProxyConfig;
use crate::queue::{AggregateStats, TaskQueue};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub queue: Arc<TaskQueue>,
    pub stats: Arc<AggregateStats>,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: Arc<ProxyConfig>,
        queue: Arc<TaskQueue>,
        stats: Arc<AggregateStats>,
    ) -> Self {
        Self {
            config,
            queue,
            stats,
            prometheus: crate::metrics::metrics_handle(),
        }
    }
}

/// Create the API router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let namespace = state.config.server.namespace.trim_matches('/').to_string();
    let max_body = state.config.server.max_body_bytes;

    Router::new()
        .route("/", get(stats::handle))
        .route(&format!("/{}/v1/models", namespace), get(models::handle))
        .route(
            &format!("/{}/v1/chat/completions", namespace),
            post(completions::handle),
        )
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body))
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}
