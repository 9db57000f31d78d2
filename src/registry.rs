//! Per-queue gauge sets.
//!
//! Each queue gets five gauges named `{namespace}_{kind}` with a constant
//! `queue` label. The registry is built once from the queues known at startup
//! and never changes afterwards.

use prometheus::{Gauge, Opts, Registry};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::backend::QueueStats;

/// Default metric namespace, matching the rmq key prefix.
pub const DEFAULT_NAMESPACE: &str = "rmq";

/// Label carrying the queue name on every gauge.
pub const QUEUE_LABEL: &str = "queue";

/// Error type for building the gauge registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Metric {metric} for queue {queue:?} is already registered")]
    AlreadyRegistered { queue: String, metric: &'static str },

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// The five statistics exported per queue, in update order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Ready,
    Rejected,
    Connection,
    Consumer,
    Unacked,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Ready,
        MetricKind::Rejected,
        MetricKind::Connection,
        MetricKind::Consumer,
        MetricKind::Unacked,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Ready => "ready",
            MetricKind::Rejected => "rejected",
            MetricKind::Connection => "connection",
            MetricKind::Consumer => "consumer",
            MetricKind::Unacked => "unacked",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            MetricKind::Ready => "Number of ready messages on queue",
            MetricKind::Rejected => "Number of rejected messages on queue",
            MetricKind::Connection => "Number of connections consuming a queue",
            MetricKind::Consumer => "Number of consumers consuming messages for a queue",
            MetricKind::Unacked => "Number of unacked messages on a consumer",
        }
    }

    /// Read this kind's value out of a stats snapshot.
    pub fn value(self, stats: &QueueStats) -> f64 {
        let count = match self {
            MetricKind::Ready => stats.ready,
            MetricKind::Rejected => stats.rejected,
            MetricKind::Connection => stats.connection_count(),
            MetricKind::Consumer => stats.consumer_count(),
            MetricKind::Unacked => stats.unacked_count(),
        };
        count as f64
    }
}

/// Gauges for one queue.
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    pub ready: Gauge,
    pub rejected: Gauge,
    pub connection: Gauge,
    pub consumer: Gauge,
    pub unacked: Gauge,
}

impl QueueMetrics {
    fn new(namespace: &str, queue: &str) -> Result<Self, prometheus::Error> {
        let gauge = |kind: MetricKind| {
            Gauge::with_opts(
                Opts::new(kind.name(), kind.help())
                    .namespace(namespace)
                    .const_label(QUEUE_LABEL, queue),
            )
        };
        Ok(Self {
            ready: gauge(MetricKind::Ready)?,
            rejected: gauge(MetricKind::Rejected)?,
            connection: gauge(MetricKind::Connection)?,
            consumer: gauge(MetricKind::Consumer)?,
            unacked: gauge(MetricKind::Unacked)?,
        })
    }

    pub fn gauge(&self, kind: MetricKind) -> &Gauge {
        match kind {
            MetricKind::Ready => &self.ready,
            MetricKind::Rejected => &self.rejected,
            MetricKind::Connection => &self.connection,
            MetricKind::Consumer => &self.consumer,
            MetricKind::Unacked => &self.unacked,
        }
    }

    /// Overwrite all five gauges with freshly observed values.
    pub fn apply(&self, stats: &QueueStats) {
        for kind in MetricKind::ALL {
            self.gauge(kind).set(kind.value(stats));
        }
    }
}

/// Frozen mapping from queue name to its gauges.
#[derive(Debug, Default)]
pub struct QueueMetricsRegistry {
    queues: BTreeMap<String, QueueMetrics>,
}

impl QueueMetricsRegistry {
    /// Create and register gauges for every queue in `queue_names`.
    ///
    /// Duplicate names collapse into one metric set. If any gauge collides with
    /// one already in `registry`, the gauges registered by this call are
    /// removed again and the collision is returned.
    pub fn build<I, S>(
        registry: &Registry,
        namespace: &str,
        queue_names: I,
    ) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = queue_names.into_iter().map(Into::into).collect();
        let mut queues = BTreeMap::new();
        let mut registered: Vec<Gauge> = Vec::with_capacity(names.len() * MetricKind::ALL.len());

        for queue in names {
            let metrics = match QueueMetrics::new(namespace, &queue) {
                Ok(metrics) => metrics,
                Err(e) => {
                    rollback(registry, &registered);
                    return Err(e.into());
                }
            };

            for kind in MetricKind::ALL {
                let gauge = metrics.gauge(kind).clone();
                if let Err(e) = registry.register(Box::new(gauge.clone())) {
                    rollback(registry, &registered);
                    return Err(match e {
                        prometheus::Error::AlreadyReg => RegistryError::AlreadyRegistered {
                            queue,
                            metric: kind.name(),
                        },
                        other => RegistryError::Prometheus(other),
                    });
                }
                registered.push(gauge);
            }

            queues.insert(queue, metrics);
        }

        tracing::info!(namespace, queues = queues.len(), "Registered queue gauges");

        Ok(Self { queues })
    }

    /// Gauges for `queue`, if it was known at build time.
    pub fn get(&self, queue: &str) -> Option<&QueueMetrics> {
        self.queues.get(queue)
    }

    pub fn contains(&self, queue: &str) -> bool {
        self.queues.contains_key(queue)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Remove every gauge in this set from `registry`.
    ///
    /// Used to undo a build when later startup steps fail.
    pub fn unregister(&self, registry: &Registry) {
        let gauges: Vec<Gauge> = self
            .queues
            .values()
            .flat_map(|m| MetricKind::ALL.map(|kind| m.gauge(kind).clone()))
            .collect();
        rollback(registry, &gauges);
    }

    /// Registered queue names in sorted order.
    pub fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }
}

fn rollback(registry: &Registry, registered: &[Gauge]) {
    for gauge in registered {
        if let Err(e) = registry.unregister(Box::new(gauge.clone())) {
            tracing::warn!(error = %e, "Failed to unregister gauge during rollback");
        }
    }
}
