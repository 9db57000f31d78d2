//! rmq-exporter: Prometheus gauges for rmq work queues.
//!
//! # Usage
//!
//! ```bash
//! rmq-exporter --redis-url redis://127.0.0.1:6379 --metrics-port 9121
//! ```
//!
//! Environment variables can also be used:
//! - `RMQ_EXPORTER_REDIS_URL`: Redis URL of the rmq deployment
//! - `RMQ_EXPORTER_METRICS_PORT`: Port for the `/metrics` endpoint
//! - `RMQ_EXPORTER_INTERVAL_MS`: Sampling interval
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use rmq_exporter::config::Config;
use rmq_exporter::observability::tracing::init_tracing;
use rmq_exporter::server::run_exporter;
use tokio_util::sync::CancellationToken;

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level, config.log_format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        redis_url = %config.redis_url,
        namespace = %config.namespace,
        interval_ms = config.interval_ms,
        "Starting rmq-exporter"
    );

    let cancel = CancellationToken::new();

    // Spawn signal handler task
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => signal_cancel.cancel(),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        }
    });

    run_exporter(config, cancel).await?;

    tracing::info!("rmq-exporter shutdown complete");
    Ok(())
}
