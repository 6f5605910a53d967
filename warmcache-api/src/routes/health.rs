//! Health Check Endpoints
//!
//! - /health - Service banner
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - Store statistics and in-flight refreshes

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use warmcache_core::ResourceId;
use warmcache_storage::CacheStats;

use crate::constants::SERVICE_NAME;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthDetails {
    pub store: StoreHealth,
    pub resources: usize,
    /// Resources with an acquisition in flight.
    pub refreshing: Vec<ResourceId>,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub status: HealthStatus,
    pub backend: &'static str,
    pub stats: CacheStats,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceBanner {
    pub status: String,
    pub service: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health
pub async fn health() -> Json<ServiceBanner> {
    Json(ServiceBanner {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
///
/// Stale data is still served when writes fail, so a failing store only
/// degrades readiness and never makes the service unready.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let coordinator = &state.coordinator;
    let stats = coordinator.store().stats().await;

    let store_status = if stats.write_failures > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status: store_status,
        message: None,
        details: Some(HealthDetails {
            store: StoreHealth {
                status: store_status,
                backend: coordinator.store().backend_name(),
                stats,
                hit_rate: stats.hit_rate(),
            },
            resources: coordinator.descriptors().len(),
            refreshing: coordinator.registry().running(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    (StatusCode::OK, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Health routes, mounted at the root.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ping", get(ping))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}
