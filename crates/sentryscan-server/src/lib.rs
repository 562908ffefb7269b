//! HTTP/WebSocket/SSE surface: the stream dispatcher and task-registry
//! routes. Router assembly follows the axum + `tower-http` layering
//! idiom.

pub mod auth;
pub mod error_response;
pub mod policy;
pub mod routes;
pub mod state;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/scan", post(routes::submit_scan))
        .route("/scan/:task_id", get(routes::get_scan_status))
        .route("/scan/stream", get(routes::stream_scan))
        .route("/ws/command", get(ws::ws_command))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the server until the process is killed. Also sweeps expired tasks
/// from the registry once at startup.
pub async fn run(state: Arc<AppState>, addr: SocketAddr, retention_days: i64) -> std::io::Result<()> {
    if let Err(e) = state.registry.enforce_retention(retention_days).await {
        tracing::warn!(error = %e, "startup retention sweep failed");
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "sentryscan-server listening");
    axum::serve(listener, app).await
}

/// Small helper so callers don't need to depend on `std::time::Duration`
/// directly just to configure the SSE keep-alive interval elsewhere.
pub const DEFAULT_SSE_KEEPALIVE: Duration = Duration::from_secs(15);
