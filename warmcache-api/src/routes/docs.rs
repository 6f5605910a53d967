//! `GET /` - self-describing index of the configured resources.

use axum::{extract::State, Json};
use serde_json::{json, Map, Value};

use crate::constants::SERVICE_NAME;
use crate::state::AppState;

pub async fn index(State(state): State<AppState>) -> Json<Value> {
    let descriptors = state.coordinator.descriptors();

    let mut endpoints = Map::new();
    endpoints.insert(
        "/".to_string(),
        json!({ "method": "GET", "description": "API documentation and information" }),
    );
    endpoints.insert(
        "/health".to_string(),
        json!({ "method": "GET", "description": "Health check endpoint" }),
    );
    endpoints.insert(
        "/resources".to_string(),
        json!({ "method": "GET", "description": "Cache status of every configured resource" }),
    );
    endpoints.insert(
        "/metrics".to_string(),
        json!({ "method": "GET", "description": "Prometheus metrics" }),
    );

    let mut resources = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let id = descriptor.id.as_str();
        let policy = descriptor.policy.to_string();
        let description = descriptor
            .description
            .clone()
            .unwrap_or_else(|| format!("Cached dataset '{}'", id));

        endpoints.insert(
            format!("/api/{}", id),
            json!({
                "method": "GET",
                "description": format!("{} (from cache if present, otherwise acquired now)", description),
                "note": format!("Cache policy: {}. Stale data is served while a refresh runs.", policy),
            }),
        );
        endpoints.insert(
            format!("/api/{}/refresh", id),
            json!({ "method": "POST", "description": "Force a fresh acquisition" }),
        );
        endpoints.insert(
            format!("/api/{}/cache-status", id),
            json!({ "method": "GET", "description": "Check the status of the cached entry" }),
        );

        resources.push(json!({
            "id": id,
            "description": description,
            "policy": policy,
            "ttl_secs": descriptor.policy.ttl_secs(),
            "source": descriptor.acquirer.kind(),
        }));
    }

    let example = descriptors.first().map(|d| d.id.as_str()).unwrap_or("{resource}");

    Json(json!({
        "message": format!("{} API", SERVICE_NAME),
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Refresh-ahead cache for slow, scraped datasets",
        "resources": resources,
        "endpoints": endpoints,
        "example_usage": {
            "curl_get": format!("curl http://localhost:5000/api/{}", example),
            "curl_refresh": format!("curl -X POST http://localhost:5000/api/{}/refresh", example),
            "curl_cache_status": format!("curl http://localhost:5000/api/{}/cache-status", example),
        },
        "response_format": {
            "status": "success or error",
            "served": "cold, fresh, stale, forced or joined",
            "from_cache": "boolean indicating if data is from cache",
            "cache_valid": "false while stale data is served",
            "refreshing_in_background": "true when a refresh was started or is running",
            "cache_date": "when the cached entry was acquired (if from cache)",
            "acquired_at": "when the served data was acquired",
            "data": "the dataset",
        },
    }))
}
