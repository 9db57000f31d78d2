//! In-memory queue backend.
//!
//! A scriptable stand-in for a live rmq deployment: tests set the open queues
//! and per-queue statistics directly and can make either call fail.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BackendError, QueueBackend, QueueStats, StatsSnapshot};

#[derive(Debug, Default)]
struct State {
    open: BTreeSet<String>,
    stats: BTreeMap<String, QueueStats>,
}

/// Backend whose answers are set by the caller.
///
/// `collect_stats` returns stats only for requested queues that have stats
/// set, so omitting a queue's stats simulates a partial snapshot.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    fail_open_queues: AtomicBool,
    fail_collect_stats: AtomicBool,
    open_queues_calls: AtomicUsize,
    collect_stats_calls: AtomicUsize,
}

impl InMemoryBackend {
    /// Create an empty backend with no open queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with the given queues open and no stats.
    pub fn with_queues<I, S>(queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        for queue in queues {
            backend.open_queue(queue);
        }
        backend
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a queue as open.
    pub fn open_queue(&self, queue: impl Into<String>) {
        self.lock().open.insert(queue.into());
    }

    /// Set the stats reported for a queue, opening it if needed.
    pub fn set_stats(&self, queue: impl Into<String>, stats: QueueStats) {
        let queue = queue.into();
        let mut state = self.lock();
        state.open.insert(queue.clone());
        state.stats.insert(queue, stats);
    }

    /// Stop reporting stats for a queue. The queue stays open.
    pub fn clear_stats(&self, queue: &str) {
        self.lock().stats.remove(queue);
    }

    /// Make `open_queues` fail until reset.
    pub fn set_fail_open_queues(&self, fail: bool) {
        self.fail_open_queues.store(fail, Ordering::SeqCst);
    }

    /// Make `collect_stats` fail until reset.
    pub fn set_fail_collect_stats(&self, fail: bool) {
        self.fail_collect_stats.store(fail, Ordering::SeqCst);
    }

    /// Number of `open_queues` calls made so far.
    pub fn open_queues_calls(&self) -> usize {
        self.open_queues_calls.load(Ordering::SeqCst)
    }

    /// Number of `collect_stats` calls made so far.
    pub fn collect_stats_calls(&self) -> usize {
        self.collect_stats_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    async fn open_queues(&self) -> Result<Vec<String>, BackendError> {
        self.open_queues_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open_queues.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("open_queues failure injected".into()));
        }
        Ok(self.lock().open.iter().cloned().collect())
    }

    async fn collect_stats(&self, queues: &[String]) -> Result<StatsSnapshot, BackendError> {
        self.collect_stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_collect_stats.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("collect_stats failure injected".into()));
        }
        let state = self.lock();
        let queue_stats = queues
            .iter()
            .filter_map(|q| state.stats.get(q).map(|s| (q.clone(), s.clone())))
            .collect();
        Ok(StatsSnapshot { queue_stats })
    }
}
