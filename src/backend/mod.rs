//! Queue backend introspection.
//!
//! Provides:
//! - The [`QueueBackend`] trait consumed by the sampler
//! - Snapshot types mirroring rmq's queue statistics
//! - An rmq/Redis implementation and an in-memory one for tests

pub mod memory;
pub mod rmq;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::InMemoryBackend;
pub use self::rmq::RmqBackend;

/// Error type for backend introspection calls.
///
/// Every variant is transient from the sampler's point of view.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// One connection's view of a queue it consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStat {
    /// Whether the connection's heartbeat is still alive.
    pub active: bool,
    /// Deliveries handed to this connection's consumers but not yet acked.
    pub unacked: u64,
    /// Names of this connection's consumers on the queue.
    pub consumers: Vec<String>,
}

impl ConnectionStat {
    pub fn new(active: bool, unacked: u64, consumers: Vec<String>) -> Self {
        Self {
            active,
            unacked,
            consumers,
        }
    }
}

/// Statistics for a single queue at sampling time.
///
/// `ready` and `rejected` come straight from the queue; the other three counts
/// are derived from the per-connection detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Deliveries waiting for a consumer.
    pub ready: u64,
    /// Deliveries permanently failed.
    pub rejected: u64,
    /// Connections consuming this queue, by connection name.
    pub connections: BTreeMap<String, ConnectionStat>,
}

impl QueueStats {
    pub fn new(ready: u64, rejected: u64) -> Self {
        Self {
            ready,
            rejected,
            connections: BTreeMap::new(),
        }
    }

    /// Add or replace one connection's detail.
    #[must_use]
    pub fn with_connection(mut self, name: impl Into<String>, stat: ConnectionStat) -> Self {
        self.connections.insert(name.into(), stat);
        self
    }

    /// Number of connections servicing the queue.
    pub fn connection_count(&self) -> u64 {
        self.connections.len() as u64
    }

    /// Number of consumers across all connections.
    pub fn consumer_count(&self) -> u64 {
        self.connections
            .values()
            .map(|c| c.consumers.len() as u64)
            .sum()
    }

    /// Unacked deliveries across all connections.
    pub fn unacked_count(&self) -> u64 {
        self.connections.values().map(|c| c.unacked).sum()
    }
}

/// Statistics for a set of queues, keyed by queue name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub queue_stats: BTreeMap<String, QueueStats>,
}

impl StatsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.queue_stats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue_stats.len()
    }
}

/// Introspection operations the sampler needs from a queueing backend.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Names of all currently open queues.
    async fn open_queues(&self) -> Result<Vec<String>, BackendError>;

    /// Statistics for the given queues.
    ///
    /// Queues without any data may be absent from the snapshot.
    async fn collect_stats(&self, queues: &[String]) -> Result<StatsSnapshot, BackendError>;
}
