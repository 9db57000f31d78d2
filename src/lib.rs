//! rmq-exporter: live Prometheus gauges for rmq work queues.
//!
//! Once per interval the exporter asks the queueing backend which queues are
//! open and how they are doing, then overwrites one set of five gauges per
//! queue with the observed values.
//!
//! # Architecture
//!
//! - **Frozen registry**: metric sets are created once, from the queues that
//!   exist at startup
//! - **Overwrite on tick**: every sample is the instantaneous state, never a delta
//! - **Tolerant**: a failed backend call degrades one tick and is logged; the
//!   next tick repairs it
//!
//! # Modules
//!
//! - [`backend`]: Queue backend trait, rmq/Redis and in-memory implementations
//! - [`config`]: CLI and environment configuration
//! - [`observability`]: Tracing setup, self-metrics and the scrape endpoint
//! - [`registry`]: Per-queue gauge sets
//! - [`sampler`]: The background sampling loop
//! - [`server`]: Process wiring

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // registry::QueueMetricsRegistry is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::cast_precision_loss      // Queue counts never approach 2^53
)]

pub mod backend;
pub mod config;
pub mod observability;
pub mod registry;
pub mod sampler;
pub mod server;

pub use backend::{ConnectionStat, QueueBackend, QueueStats, StatsSnapshot};
pub use registry::{QueueMetrics, QueueMetricsRegistry, RegistryError};
pub use sampler::{SampleOutcome, Sampler, SamplerConfig};
