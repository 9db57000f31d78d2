//! rmq backend over Redis.
//!
//! Reads the key layout maintained by rmq producers and consumers:
//!
//! - `{prefix}::queues` - set of open queue names
//! - `{prefix}::queue::[{queue}]::ready` / `::rejected` - delivery lists
//! - `{prefix}::connections` - set of connection names
//! - `{prefix}::connection::{conn}::heartbeat` - alive while its TTL is positive
//! - `{prefix}::connection::{conn}::queues` - queues the connection consumes
//! - `{prefix}::connection::{conn}::queue::[{queue}]::consumers` / `::unacked`

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashSet;

use super::{BackendError, ConnectionStat, QueueBackend, QueueStats, StatsSnapshot};

/// Default key prefix used by rmq.
pub const DEFAULT_KEY_PREFIX: &str = "rmq";

/// Builds rmq key names for a given prefix.
#[derive(Debug, Clone)]
pub struct RmqKeys {
    prefix: String,
}

impl RmqKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn queues(&self) -> String {
        format!("{}::queues", self.prefix)
    }

    pub fn ready(&self, queue: &str) -> String {
        format!("{}::queue::[{queue}]::ready", self.prefix)
    }

    pub fn rejected(&self, queue: &str) -> String {
        format!("{}::queue::[{queue}]::rejected", self.prefix)
    }

    pub fn connections(&self) -> String {
        format!("{}::connections", self.prefix)
    }

    pub fn heartbeat(&self, connection: &str) -> String {
        format!("{}::connection::{connection}::heartbeat", self.prefix)
    }

    pub fn connection_queues(&self, connection: &str) -> String {
        format!("{}::connection::{connection}::queues", self.prefix)
    }

    pub fn consumers(&self, connection: &str, queue: &str) -> String {
        format!(
            "{}::connection::{connection}::queue::[{queue}]::consumers",
            self.prefix
        )
    }

    pub fn unacked(&self, connection: &str, queue: &str) -> String {
        format!(
            "{}::connection::{connection}::queue::[{queue}]::unacked",
            self.prefix
        )
    }
}

impl Default for RmqKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

/// Queue backend reading an rmq deployment.
///
/// Holds a [`ConnectionManager`], which reconnects on its own after Redis
/// errors, so a failed tick does not poison later ones.
#[derive(Clone)]
pub struct RmqBackend {
    conn: ConnectionManager,
    keys: RmqKeys,
}

impl RmqBackend {
    /// Connect to Redis at `url` and read keys under `key_prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(key_prefix, "Connected to rmq backend");
        Ok(Self {
            conn,
            keys: RmqKeys::new(key_prefix),
        })
    }
}

#[async_trait]
impl QueueBackend for RmqBackend {
    async fn open_queues(&self) -> Result<Vec<String>, BackendError> {
        let mut conn = self.conn.clone();
        let queues: Vec<String> = conn.smembers(self.keys.queues()).await?;
        Ok(queues)
    }

    async fn collect_stats(&self, queues: &[String]) -> Result<StatsSnapshot, BackendError> {
        let mut snapshot = StatsSnapshot::default();
        if queues.is_empty() {
            return Ok(snapshot);
        }

        let mut conn = self.conn.clone();

        for queue in queues {
            let (ready, rejected): (u64, u64) = redis::pipe()
                .llen(self.keys.ready(queue))
                .llen(self.keys.rejected(queue))
                .query_async(&mut conn)
                .await?;
            snapshot
                .queue_stats
                .insert(queue.clone(), QueueStats::new(ready, rejected));
        }

        let requested: HashSet<&str> = queues.iter().map(String::as_str).collect();
        let connections: Vec<String> = conn.smembers(self.keys.connections()).await?;

        for connection in connections {
            let ttl: i64 = conn.ttl(self.keys.heartbeat(&connection)).await?;
            let active = ttl > 0;

            let consuming: Vec<String> = conn
                .smembers(self.keys.connection_queues(&connection))
                .await?;

            for queue in consuming {
                if !requested.contains(queue.as_str()) {
                    continue;
                }
                let consumers: Vec<String> = conn
                    .smembers(self.keys.consumers(&connection, &queue))
                    .await?;
                let unacked: u64 = conn.llen(self.keys.unacked(&connection, &queue)).await?;

                if let Some(stats) = snapshot.queue_stats.get_mut(&queue) {
                    stats.connections.insert(
                        connection.clone(),
                        ConnectionStat::new(active, unacked, consumers),
                    );
                }
            }
        }

        Ok(snapshot)
    }
}
