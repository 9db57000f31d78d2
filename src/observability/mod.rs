//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing
//! - Self-metrics for the sampling loop
//! - HTTP endpoints for Prometheus scraping

pub mod metrics;
pub mod prometheus;
pub mod tracing;
