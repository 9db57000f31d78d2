//! Test utilities for rmq-exporter integration tests.
//!
//! Provides:
//! - Queue stats builders
//! - A sampler harness over the in-memory backend
//! - Polling helpers for the background loop
//! - Log capture for asserting on emitted events

#![allow(dead_code)]

use prometheus::Registry;
use rmq_exporter::backend::InMemoryBackend;
use rmq_exporter::observability::metrics::SamplerMetrics;
use rmq_exporter::{ConnectionStat, QueueMetricsRegistry, QueueStats, Sampler, SamplerConfig};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Build stats with the given counts.
///
/// `connections` connections are created; the consumers and unacked
/// deliveries are all attributed to the first one.
pub fn stats(ready: u64, rejected: u64, connections: u64, consumers: u64, unacked: u64) -> QueueStats {
    let mut stats = QueueStats::new(ready, rejected);
    for i in 0..connections {
        let stat = if i == 0 {
            ConnectionStat::new(
                true,
                unacked,
                (0..consumers).map(|c| format!("consumer-{c}")).collect(),
            )
        } else {
            ConnectionStat::new(true, 0, Vec::new())
        };
        stats = stats.with_connection(format!("conn-{i}"), stat);
    }
    stats
}

/// Sampler wired to an in-memory backend and a private registry.
pub struct Harness {
    pub backend: Arc<InMemoryBackend>,
    pub registry: Registry,
    pub gauges: Arc<QueueMetricsRegistry>,
    pub metrics: SamplerMetrics,
    pub sampler: Sampler,
}

impl Harness {
    /// Register gauges for `queues` and build a sampler over `backend`.
    pub fn new(backend: Arc<InMemoryBackend>, queues: &[&str], interval: Duration) -> Self {
        let registry = Registry::new();
        let gauges = Arc::new(
            QueueMetricsRegistry::build(&registry, "rmq", queues.iter().copied())
                .expect("failed to build gauges"),
        );
        let metrics = SamplerMetrics::register(&registry, "rmq").expect("failed to register self-metrics");
        let config = SamplerConfig {
            interval,
            backend_timeout: None,
        };
        let sampler = Sampler::new(backend.clone(), Arc::clone(&gauges), config)
            .with_metrics(metrics.clone());

        Self {
            backend,
            registry,
            gauges,
            metrics,
            sampler,
        }
    }

    /// The five gauge values for `queue`, in update order.
    pub fn values(&self, queue: &str) -> [f64; 5] {
        gauge_values(&self.gauges, queue)
    }

    /// Number of metric families currently registered.
    pub fn family_count(&self) -> usize {
        self.registry.gather().len()
    }
}

/// The five gauge values for `queue`, in update order.
pub fn gauge_values(gauges: &QueueMetricsRegistry, queue: &str) -> [f64; 5] {
    let m = gauges.get(queue).expect("queue not registered");
    [
        m.ready.get(),
        m.rejected.get(),
        m.connection.get(),
        m.consumer.get(),
        m.unacked.get(),
    ]
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Events emitted by this crate while a capture is installed.
#[derive(Clone, Default)]
pub struct CapturedEvents(Arc<Mutex<Vec<(Level, String)>>>);

impl CapturedEvents {
    /// Route this thread's events into a new capture until the guard drops.
    ///
    /// `#[tokio::test]` runs on a current-thread runtime, so everything the
    /// test awaits directly is seen.
    pub fn install() -> (Self, DefaultGuard) {
        let events = Self::default();
        let subscriber = tracing_subscriber::registry().with(events.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (events, guard)
    }

    pub fn all(&self) -> Vec<(Level, String)> {
        self.0.lock().unwrap().clone()
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with("rmq_exporter") {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.0
            .lock()
            .unwrap()
            .push((*metadata.level(), visitor.message));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}
