//! Background sampling loop.
//!
//! Once per interval the sampler lists the open queues, collects their stats
//! and overwrites the matching gauges. Backend failures are logged and
//! counted; the loop keeps going and the next tick repairs any stale values.
//! Queues missing from the frozen registry are skipped without a trace.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, QueueBackend, StatsSnapshot};
use crate::observability::metrics::{BackendOperation, SamplerMetrics};
use crate::registry::QueueMetricsRegistry;

/// Default time between sampling iterations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Sampling loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Time to wait after each iteration.
    pub interval: Duration,
    /// Upper bound for each backend call. `None` waits indefinitely.
    pub backend_timeout: Option<Duration>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            backend_timeout: None,
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Queues whose gauges were overwritten.
    pub updated: usize,
    /// Queues in the snapshot with no registered gauges.
    pub skipped: usize,
    pub open_queues_failed: bool,
    pub collect_stats_failed: bool,
}

/// Periodically copies backend stats into the queue gauges.
pub struct Sampler {
    backend: Arc<dyn QueueBackend>,
    gauges: Arc<QueueMetricsRegistry>,
    config: SamplerConfig,
    metrics: Option<SamplerMetrics>,
}

impl Sampler {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        gauges: Arc<QueueMetricsRegistry>,
        config: SamplerConfig,
    ) -> Self {
        Self {
            backend,
            gauges,
            config,
            metrics: None,
        }
    }

    /// Record failures and iteration timings into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SamplerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the loop on its own task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Sample every interval until `cancel` fires.
    ///
    /// Cancellation is checked before each iteration and while waiting for the
    /// next one. A backend call already in flight is allowed to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            queues = self.gauges.len(),
            "Sampling loop started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = self.sample_once().await;
            tracing::debug!(
                updated = outcome.updated,
                skipped = outcome.skipped,
                "Sampled queue stats"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }

        tracing::info!("Sampling loop stopped");
    }

    /// Perform a single iteration: list, collect, overwrite.
    pub async fn sample_once(&self) -> SampleOutcome {
        let started = Instant::now();
        let mut outcome = SampleOutcome::default();

        let queues = match self.bounded(self.backend.open_queues()).await {
            Ok(queues) => queues,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list open queues for rmq metrics");
                self.record_error(BackendOperation::OpenQueues);
                outcome.open_queues_failed = true;
                Vec::new()
            }
        };

        let snapshot = match self.bounded(self.backend.collect_stats(&queues)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect stats for rmq metrics");
                self.record_error(BackendOperation::CollectStats);
                outcome.collect_stats_failed = true;
                StatsSnapshot::default()
            }
        };

        for (queue, stats) in &snapshot.queue_stats {
            match self.gauges.get(queue) {
                Some(metrics) => {
                    metrics.apply(stats);
                    outcome.updated += 1;
                }
                None => outcome.skipped += 1,
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_sample(started.elapsed().as_secs_f64());
        }

        outcome
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match self.config.backend_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(BackendError::Timeout(limit))),
            None => call.await,
        }
    }

    fn record_error(&self, operation: BackendOperation) {
        if let Some(metrics) = &self.metrics {
            metrics.record_backend_error(operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, QueueStats};
    use async_trait::async_trait;
    use prometheus::Registry;

    fn sampler_for(backend: Arc<dyn QueueBackend>, queues: &[&str]) -> (Sampler, SamplerMetrics) {
        let registry = Registry::new();
        let gauges = QueueMetricsRegistry::build(&registry, "rmq", queues.iter().copied()).unwrap();
        let metrics = SamplerMetrics::unregistered("rmq").unwrap();
        let sampler = Sampler::new(backend, Arc::new(gauges), SamplerConfig::default())
            .with_metrics(metrics.clone());
        (sampler, metrics)
    }

    /// Backend whose calls never complete.
    struct StalledBackend;

    #[async_trait]
    impl QueueBackend for StalledBackend {
        async fn open_queues(&self) -> Result<Vec<String>, BackendError> {
            std::future::pending().await
        }

        async fn collect_stats(&self, _queues: &[String]) -> Result<StatsSnapshot, BackendError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_default_config() {
        let config = SamplerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.backend_timeout, None);
    }

    #[tokio::test]
    async fn test_sample_once_updates_registered_queue() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_stats("orders", QueueStats::new(5, 2));
        let (sampler, metrics) = sampler_for(backend, &["orders"]);

        let outcome = sampler.sample_once().await;

        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(sampler.gauges.get("orders").unwrap().ready.get(), 5.0);
        assert_eq!(sampler.gauges.get("orders").unwrap().rejected.get(), 2.0);
        assert_eq!(metrics.samples_total.get(), 1);
    }

    #[tokio::test]
    async fn test_sample_once_counts_skipped_queue() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_stats("new-queue", QueueStats::new(9, 0));
        let (sampler, _) = sampler_for(backend, &["orders"]);

        let outcome = sampler.sample_once().await;

        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.skipped, 1);
        assert!(!sampler.gauges.contains("new-queue"));
    }

    #[tokio::test]
    async fn test_open_queues_failure_is_counted() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_stats("orders", QueueStats::new(5, 0));
        backend.set_fail_open_queues(true);
        let (sampler, metrics) = sampler_for(backend.clone(), &["orders"]);

        let outcome = sampler.sample_once().await;

        assert!(outcome.open_queues_failed);
        assert!(!outcome.collect_stats_failed);
        assert_eq!(outcome.updated, 0);
        assert_eq!(backend.collect_stats_calls(), 1);
        assert_eq!(metrics.backend_errors(BackendOperation::OpenQueues), 1);
    }

    #[tokio::test]
    async fn test_collect_stats_failure_is_counted() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_stats("orders", QueueStats::new(5, 0));
        backend.set_fail_collect_stats(true);
        let (sampler, metrics) = sampler_for(backend, &["orders"]);

        let outcome = sampler.sample_once().await;

        assert!(outcome.collect_stats_failed);
        assert_eq!(outcome.updated, 0);
        assert_eq!(metrics.backend_errors(BackendOperation::CollectStats), 1);
        assert_eq!(metrics.samples_total.get(), 1);
    }

    #[tokio::test]
    async fn test_backend_timeout_is_transient_failure() {
        let registry = Registry::new();
        let gauges = QueueMetricsRegistry::build(&registry, "rmq", ["orders"]).unwrap();
        let metrics = SamplerMetrics::unregistered("rmq").unwrap();
        let config = SamplerConfig {
            interval: Duration::from_millis(10),
            backend_timeout: Some(Duration::from_millis(20)),
        };
        let sampler = Sampler::new(Arc::new(StalledBackend), Arc::new(gauges), config)
            .with_metrics(metrics.clone());

        let outcome = sampler.sample_once().await;

        assert!(outcome.open_queues_failed);
        assert!(outcome.collect_stats_failed);
        assert_eq!(metrics.backend_errors(BackendOperation::OpenQueues), 1);
        assert_eq!(metrics.backend_errors(BackendOperation::CollectStats), 1);
    }

    #[tokio::test]
    async fn test_run_exits_immediately_when_already_cancelled() {
        let backend = Arc::new(InMemoryBackend::with_queues(["orders"]));
        let (sampler, _) = sampler_for(backend.clone(), &["orders"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        sampler.run(cancel).await;

        assert_eq!(backend.open_queues_calls(), 0);
        assert_eq!(backend.collect_stats_calls(), 0);
    }
}
