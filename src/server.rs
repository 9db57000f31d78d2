//! Exporter setup and lifecycle.
//!
//! Wires together:
//! - The rmq backend connection
//! - The frozen gauge registry, built from the queues open at startup
//! - The sampling loop and the Prometheus endpoint, both stopped by one token

use anyhow::Context;
use prometheus::Registry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{QueueBackend, RmqBackend};
use crate::config::Config;
use crate::observability::metrics::SamplerMetrics;
use crate::observability::prometheus::run_prometheus_server;
use crate::registry::QueueMetricsRegistry;
use crate::sampler::{Sampler, SamplerConfig};

/// A running sampler and the registry it writes into.
pub struct Exporter {
    pub registry: Registry,
    pub gauges: Arc<QueueMetricsRegistry>,
    pub sampler: JoinHandle<()>,
}

/// Discover queues, register their gauges and start sampling.
///
/// Queue discovery happens once; queues opened later are not exported.
///
/// # Errors
///
/// Returns an error if the initial queue listing fails or registration
/// collides with metrics already in `registry`. Nothing stays registered on
/// error.
pub async fn start_exporter(
    backend: Arc<dyn QueueBackend>,
    registry: Registry,
    namespace: &str,
    config: SamplerConfig,
    cancel: CancellationToken,
) -> anyhow::Result<Exporter> {
    let queues = backend
        .open_queues()
        .await
        .context("failed to discover open queues at startup")?;

    let gauges = QueueMetricsRegistry::build(&registry, namespace, queues)
        .context("failed to register queue gauges")?;
    let gauges = Arc::new(gauges);

    let metrics = match SamplerMetrics::register(&registry, namespace) {
        Ok(metrics) => metrics,
        Err(e) => {
            gauges.unregister(&registry);
            return Err(anyhow::Error::new(e).context("failed to register exporter self-metrics"));
        }
    };

    let sampler = Sampler::new(backend, Arc::clone(&gauges), config)
        .with_metrics(metrics)
        .spawn(cancel);

    Ok(Exporter {
        registry,
        gauges,
        sampler,
    })
}

/// Run the exporter until `cancel` fires.
///
/// # Arguments
///
/// * `config` - Exporter configuration
/// * `cancel` - Token signalling shutdown
pub async fn run_exporter(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let metrics_addr = config
        .metrics_addr()
        .context("invalid metrics listen address")?;

    let backend = RmqBackend::connect(&config.redis_url, &config.key_prefix)
        .await
        .context("failed to connect to rmq backend")?;

    let exporter = start_exporter(
        Arc::new(backend),
        Registry::new(),
        &config.namespace,
        config.sampler_config(),
        cancel.clone(),
    )
    .await?;

    tracing::info!(
        queues = exporter.gauges.len(),
        "Exporting metrics for queues"
    );

    let served = run_prometheus_server(metrics_addr, exporter.registry.clone(), cancel.clone()).await;

    // Stop the sampler whether the endpoint exited cleanly or not.
    cancel.cancel();
    tracing::info!("Waiting for sampling loop to stop");
    if let Err(e) = exporter.sampler.await {
        tracing::error!(error = %e, "Sampling task failed");
    }

    served.context("metrics server error")?;
    tracing::info!("Exporter stopped");
    Ok(())
}
