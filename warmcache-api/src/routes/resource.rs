//! Resource endpoints.
//!
//! - `GET /api/:resource`: cached read (cold reads block on acquisition)
//! - `POST /api/:resource/refresh`: forced refresh
//! - `GET /api/:resource/cache-status`: introspection, never acquires
//! - `GET /resources`: status of every configured resource

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use warmcache_core::{ResourceId, Timestamp};
use warmcache_refresh::{ResourceStatus, ServeKind, ServedPayload};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::telemetry::metrics;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// Body of a read or forced refresh.
#[derive(Debug, Clone, Serialize)]
pub struct ReadResponse {
    pub status: &'static str,
    pub resource_id: ResourceId,
    /// How the read was satisfied.
    pub served: ServeKind,
    pub from_cache: bool,
    pub cache_valid: bool,
    pub refreshing_in_background: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_date: Option<Timestamp>,
    pub acquired_at: Timestamp,
    pub forced: bool,
    pub joined_in_flight: bool,
    pub data: Value,
}

impl From<ServedPayload> for ReadResponse {
    fn from(served: ServedPayload) -> Self {
        Self {
            status: "success",
            resource_id: served.resource_id,
            served: served.kind,
            from_cache: served.from_cache,
            cache_valid: served.cache_valid,
            refreshing_in_background: served.refreshing_in_background,
            cache_date: served.cache_date,
            acquired_at: served.acquired_at,
            forced: served.forced,
            joined_in_flight: served.joined_in_flight,
            data: served.payload,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatusResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub resource: ResourceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceListResponse {
    pub status: &'static str,
    pub count: usize,
    pub resources: Vec<ResourceStatus>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/:resource
pub async fn read(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> ApiResult<Json<ReadResponse>> {
    let resource_id = ResourceId::new(resource)?;
    let served = state.coordinator.read(&resource_id).await?;
    record_serve(&served);
    Ok(Json(served.into()))
}

/// POST /api/:resource/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> ApiResult<Json<ReadResponse>> {
    let resource_id = ResourceId::new(resource)?;
    let served = state.coordinator.force_refresh(&resource_id).await?;
    record_serve(&served);
    Ok(Json(served.into()))
}

/// GET /api/:resource/cache-status
pub async fn cache_status(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> ApiResult<Json<CacheStatusResponse>> {
    let resource_id = ResourceId::new(resource)?;
    let resource = state.coordinator.status(&resource_id).await?;
    Ok(Json(CacheStatusResponse {
        status: "success",
        resource,
    }))
}

/// GET /resources
pub async fn list(State(state): State<AppState>) -> Json<ResourceListResponse> {
    let resources = state.coordinator.statuses().await;
    Json(ResourceListResponse {
        status: "success",
        count: resources.len(),
        resources,
    })
}

fn record_serve(served: &ServedPayload) {
    if let Some(metrics) = metrics() {
        metrics.record_cache_read(served.resource_id.as_str(), served.kind.as_str());
    }
}
