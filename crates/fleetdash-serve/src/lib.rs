pub mod auth;
mod dashboard;
pub mod error;
pub mod http;
mod proxy;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use fleetdash_cache::RefreshOrchestrator;
use fleetdash_upstream::UpstreamApi;

pub use auth::AuthGate;
pub use error::ApiError;

// ── Config ──

pub struct ServeConfig {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub refresh_period: Duration,
}

// ── App State ──

#[derive(Clone)]
pub struct AppState {
    pub refresher: Arc<RefreshOrchestrator>,
    /// Used directly by the proxy; the refresh pipeline holds its own handle.
    pub api: Arc<dyn UpstreamApi>,
    pub auth: Arc<AuthGate>,
}

// ── Entrypoint ──

/// Run the background refresh loop and the HTTP server until Ctrl-C.
pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let refresh_loop = state
        .refresher
        .spawn_interval(config.refresh_period, shutdown.clone());

    let app = router(state, &config.static_dir);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, static_dir = %config.static_dir.display(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = refresh_loop.await {
        tracing::error!(error = %err, "refresh loop panicked");
    }
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if res.is_ok() {
                tracing::info!("shutdown requested");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

/// Build the router (for testing without binding to a port).
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let gated = Router::new()
        .route("/api/dashboard/timestamp", get(dashboard::get_timestamp))
        .route("/api/dashboard", get(dashboard::get_dashboard))
        .route("/api/proxy", get(proxy::get_proxy))
        .fallback_service(ServeDir::new(static_dir))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            auth::require_auth,
        ));

    let app = Router::new()
        .route("/api/health", get(health))
        .merge(gated)
        .with_state(state);
    http::apply_standard_layers(app)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
