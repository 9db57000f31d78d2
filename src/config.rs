//! Configuration parsing for rmq-exporter.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::backend::rmq::DEFAULT_KEY_PREFIX;
use crate::observability::tracing::LogFormat;
use crate::registry::DEFAULT_NAMESPACE;
use crate::sampler::SamplerConfig;

/// rmq-exporter: Prometheus gauges for rmq work queues.
#[derive(Parser, Debug, Clone)]
#[command(name = "rmq-exporter")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Redis URL of the rmq deployment
    #[arg(long, env = "RMQ_EXPORTER_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Key prefix rmq was configured with
    #[arg(long, env = "RMQ_EXPORTER_KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,

    /// Namespace prepended to every exported metric
    #[arg(long, env = "RMQ_EXPORTER_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Host address to bind the metrics server to
    #[arg(long, env = "RMQ_EXPORTER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the Prometheus metrics endpoint
    #[arg(short, long, env = "RMQ_EXPORTER_METRICS_PORT", default_value_t = 9121)]
    pub metrics_port: u16,

    /// Milliseconds between sampling iterations
    #[arg(long, env = "RMQ_EXPORTER_INTERVAL_MS", default_value_t = 1000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Upper bound in milliseconds for each backend call (unset waits indefinitely)
    #[arg(long, env = "RMQ_EXPORTER_BACKEND_TIMEOUT_MS",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub backend_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "RMQ_EXPORTER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Sampling loop settings derived from this configuration.
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.interval_ms),
            backend_timeout: self.backend_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Address the metrics server binds to.
    pub fn metrics_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.metrics_port).parse()
    }

    /// Create a configuration for testing.
    #[cfg(test)]
    pub fn test_config(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            host: "127.0.0.1".into(),
            metrics_port: 0, // Random port
            interval_ms: 10,
            log_level: "debug".into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".into(),
            key_prefix: DEFAULT_KEY_PREFIX.into(),
            namespace: DEFAULT_NAMESPACE.into(),
            host: "0.0.0.0".into(),
            metrics_port: 9121,
            interval_ms: 1000,
            backend_timeout_ms: None,
            log_level: "info".into(),
            log_format: LogFormat::Text,
        }
    }
}
