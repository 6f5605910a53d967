//! Telemetry: structured logging and Prometheus metrics.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, WarmcacheMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig, DEFAULT_LOG_FILTER};
