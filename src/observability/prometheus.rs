//! Scrape endpoint for the queue gauges.
//!
//! Routes:
//! - `/metrics` - every registered family in the text exposition format
//! - `/health` - liveness, always OK while the process serves
//! - `/ready` - 503 once shutdown has begun, so scrapers drain first

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for the scrape handlers.
#[derive(Clone)]
pub struct PrometheusState {
    registry: Arc<Registry>,
    shutdown: CancellationToken,
}

impl PrometheusState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            shutdown: CancellationToken::new(),
        }
    }

    /// Report not-ready once `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

pub fn create_router(state: PrometheusState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Render every metric family in `registry` in the text exposition format.
pub fn encode_metrics(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

async fn metrics_handler(State(state): State<PrometheusState>) -> impl IntoResponse {
    match encode_metrics(&state.registry) {
        Ok(buffer) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_handler(State(state): State<PrometheusState>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING DOWN")
    } else {
        (StatusCode::OK, "READY")
    }
}

/// Serve the scrape endpoint until `shutdown` is cancelled.
///
/// # Arguments
///
/// * `addr` - Address to bind to
/// * `registry` - Registry holding the queue gauges and self-metrics
/// * `shutdown` - Token that stops the server
pub async fn run_prometheus_server(
    addr: SocketAddr,
    registry: Registry,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = create_router(PrometheusState::new(registry).with_shutdown(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Serving rmq metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("Metrics endpoint shutting down");
        })
        .await
}
