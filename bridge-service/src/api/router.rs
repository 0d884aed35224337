use super::handlers::{handle_health, handle_ready, handle_stats};
use super::state::ApiState;
use axum::routing::get;
use axum::Router;
use bridge_core::foundation::{BridgeError, Result};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_api_server(addr: SocketAddr, state: Arc<ApiState>) -> Result<()> {
    info!("binding operator api addr={}", addr);
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("operator api accepting connections addr={}", addr);
    axum::serve(listener, app).await.map_err(|err| {
        error!("operator api terminated unexpectedly addr={} error={}", addr, err);
        BridgeError::Message(err.to_string())
    })
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/stats", get(handle_stats))
        .with_state(state)
}
