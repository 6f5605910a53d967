//! HTTP routes.

pub mod docs;
pub mod health;
pub mod resource;

use axum::{
    http::{header, HeaderValue, Method, Uri},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the full application router.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(docs::index))
        .route("/resources", get(resource::list))
        .route("/api/:resource", get(resource::read))
        .route("/api/:resource/refresh", post(resource::refresh))
        .route("/api/:resource/cache-status", get(resource::cache_status))
        .route("/metrics", get(metrics_handler))
        .merge(health::create_router())
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(observability_middleware))
        .layer(build_cors_layer(config))
}

async fn fallback(uri: Uri) -> ApiError {
    ApiError::route_not_found(uri.path())
}

/// Build the CORS layer.
///
/// With no configured origins every origin is allowed (development).
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
