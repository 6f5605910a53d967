//! Prometheus Metrics Definitions
//!
//! Defines all warmcache metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Acquisition latency buckets (seconds). Scrapes take seconds to minutes.
const ACQUISITION_LATENCY_BUCKETS: &[f64] =
    &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<WarmcacheMetrics>> = Lazy::new(WarmcacheMetrics::new);

/// The global metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static WarmcacheMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all warmcache metrics.
#[derive(Clone)]
pub struct WarmcacheMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Cache reads by how they were served - labels: resource, outcome
    pub cache_reads_total: CounterVec,

    /// Acquisition counter - labels: resource, status
    pub acquisitions_total: CounterVec,

    /// Acquisition duration histogram - labels: resource
    pub acquisition_duration_seconds: HistogramVec,

    /// Pre-warm checks by outcome - labels: resource, outcome
    pub prewarm_checks_total: CounterVec,
}

impl WarmcacheMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "warmcache_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "warmcache_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e))
            })?,

            cache_reads_total: register_counter_vec!(
                "warmcache_cache_reads_total",
                "Total cache reads by serve outcome",
                &["resource", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_reads_total: {}", e)))?,

            acquisitions_total: register_counter_vec!(
                "warmcache_acquisitions_total",
                "Total acquisitions by result",
                &["resource", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register acquisitions_total: {}", e)))?,

            acquisition_duration_seconds: register_histogram_vec!(
                "warmcache_acquisition_duration_seconds",
                "Acquisition duration in seconds",
                &["resource"],
                ACQUISITION_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register acquisition_duration_seconds: {}", e))
            })?,

            prewarm_checks_total: register_counter_vec!(
                "warmcache_prewarm_checks_total",
                "Total resources checked by the pre-warm job, by outcome",
                &["resource", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register prewarm_checks_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record how a read or forced refresh was served.
    pub fn record_cache_read(&self, resource: &str, outcome: &str) {
        self.cache_reads_total
            .with_label_values(&[resource, outcome])
            .inc();
    }

    /// Record one finished acquisition.
    pub fn record_acquisition(&self, resource: &str, status: &str, duration_secs: f64) {
        self.acquisitions_total
            .with_label_values(&[resource, status])
            .inc();
        self.acquisition_duration_seconds
            .with_label_values(&[resource])
            .observe(duration_secs);
    }

    /// Record one resource checked by the pre-warm job.
    pub fn record_prewarm(&self, resource: &str, outcome: &str) {
        self.prewarm_checks_total
            .with_label_values(&[resource, outcome])
            .inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
