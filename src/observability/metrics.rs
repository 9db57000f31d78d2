//! Self-metrics for the sampling loop.
//!
//! Key metrics:
//! - {namespace}_exporter_backend_errors_total: Counter of failed backend calls, by operation
//! - {namespace}_exporter_samples_total: Counter of completed sampling iterations
//! - {namespace}_exporter_sample_duration_seconds: Gauge with the last iteration's duration

use prometheus::core::Collector;
use prometheus::{Gauge, IntCounter, IntCounterVec, Opts, Registry};

/// Backend call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOperation {
    OpenQueues,
    CollectStats,
}

impl BackendOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendOperation::OpenQueues => "open_queues",
            BackendOperation::CollectStats => "collect_stats",
        }
    }
}

/// Counters describing the sampler itself, so silent degradation is visible.
#[derive(Debug, Clone)]
pub struct SamplerMetrics {
    /// Failed backend calls, labelled by `operation`.
    pub backend_errors_total: IntCounterVec,
    /// Completed sampling iterations.
    pub samples_total: IntCounter,
    /// Duration of the last sampling iteration.
    pub sample_duration_seconds: Gauge,
}

impl SamplerMetrics {
    /// Create the self-metrics and register them into `registry`.
    ///
    /// Either all three are registered or none are.
    pub fn register(registry: &Registry, namespace: &str) -> Result<Self, prometheus::Error> {
        let metrics = Self::unregistered(namespace)?;
        for (done, collector) in metrics.collectors().into_iter().enumerate() {
            if let Err(e) = registry.register(collector) {
                for registered in metrics.collectors().into_iter().take(done) {
                    if let Err(e) = registry.unregister(registered) {
                        tracing::warn!(error = %e, "Failed to unregister self-metric during rollback");
                    }
                }
                return Err(e);
            }
        }
        Ok(metrics)
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.backend_errors_total.clone()),
            Box::new(self.samples_total.clone()),
            Box::new(self.sample_duration_seconds.clone()),
        ]
    }

    /// Create the self-metrics without exporting them anywhere.
    pub fn unregistered(namespace: &str) -> Result<Self, prometheus::Error> {
        let backend_errors_total = IntCounterVec::new(
            Opts::new("backend_errors_total", "Total number of failed backend calls")
                .namespace(namespace)
                .subsystem("exporter"),
            &["operation"],
        )?;
        let samples_total = IntCounter::with_opts(
            Opts::new("samples_total", "Total number of sampling iterations")
                .namespace(namespace)
                .subsystem("exporter"),
        )?;
        let sample_duration_seconds = Gauge::with_opts(
            Opts::new(
                "sample_duration_seconds",
                "Duration of the last sampling iteration",
            )
            .namespace(namespace)
            .subsystem("exporter"),
        )?;

        Ok(Self {
            backend_errors_total,
            samples_total,
            sample_duration_seconds,
        })
    }

    /// Record a failed backend call.
    pub fn record_backend_error(&self, operation: BackendOperation) {
        self.backend_errors_total
            .with_label_values(&[operation.as_str()])
            .inc();
    }

    /// Record a completed iteration.
    pub fn record_sample(&self, duration_seconds: f64) {
        self.samples_total.inc();
        self.sample_duration_seconds.set(duration_seconds);
    }

    /// Failed calls recorded so far for `operation`.
    pub fn backend_errors(&self, operation: BackendOperation) -> u64 {
        self.backend_errors_total
            .with_label_values(&[operation.as_str()])
            .get()
    }
}
