//! warmcache Server Entry Point
//!
//! Loads configuration and the resource catalog, starts the pre-warm job,
//! and serves the Axum router until Ctrl-C.

use axum::Router;
use tokio::sync::watch;
use warmcache_api::{
    create_router, prewarm_task, ApiError, ApiResult, AppState, PrewarmConfig, ServerConfig,
};

use warmcache_api::telemetry::{init_tracer, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let config = ServerConfig::from_env()?;
    let state = AppState::bootstrap(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let prewarm = tokio::spawn(prewarm_task(
        state.coordinator.clone(),
        PrewarmConfig::from_env()?,
        shutdown_rx,
    ));

    let app: Router = create_router(state, &config);

    let addr = config.socket_addr()?;
    tracing::info!(
        %addr,
        backend = config.backend.as_str(),
        cors_restricted = config.is_production(),
        "Starting warmcache server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    match prewarm.await {
        Ok(prewarm_metrics) => {
            let totals = prewarm_metrics.snapshot();
            tracing::info!(
                sweeps = totals.sweeps,
                refreshed = totals.refreshed,
                already_fresh = totals.already_fresh,
                skipped = totals.skipped,
                failures = totals.failures,
                "Pre-warm totals at shutdown"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "Pre-warm task did not stop cleanly");
        }
    }

    Ok(())
}
