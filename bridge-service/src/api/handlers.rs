use super::state::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{debug, trace};
use std::sync::Arc;

/// Liveness only; stream health is `/ready`'s concern.
pub async fn handle_health() -> impl IntoResponse {
    trace!("health check: ok");
    Json(serde_json::json!({
        "status": "healthy",
    }))
}

pub async fn handle_ready(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let health = state.flow.health();
    let ledger_ok = health.ledger_ok();
    let chain_ok = health.chain_ok();
    let status = if ledger_ok && chain_ok { "ready" } else { "degraded" };
    if ledger_ok && chain_ok {
        trace!("ready check: ok");
    } else {
        debug!("ready check: degraded ledger_ok={} chain_ok={}", ledger_ok, chain_ok);
    }
    Json(serde_json::json!({
        "status": status,
        "ledger_ok": ledger_ok,
        "chain_ok": chain_ok,
    }))
}

pub async fn handle_stats(State(state): State<Arc<ApiState>>) -> Response {
    match state.flow.stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => {
            debug!("stats collection failed error={}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
