//! Operator API behavior over a live notary.

mod harness;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use bridge_service::api::{build_router, ApiState};
use harness::Cluster;
use std::sync::Arc;
use tower::ServiceExt;

async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().method("GET").uri(path).body(Body::empty()).expect("request");
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body bytes");
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_liveness_only() {
    let cluster = Cluster::start(1).await;
    let router = build_router(Arc::new(ApiState::new(cluster.notaries[0].flow.clone())));

    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    // Liveness stays green even when a stream degrades.
    cluster.notaries[0].flow.health().set_chain_ok(false);
    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test(flavor = "multi_thread")]
async fn ready_degrades_when_a_stream_drops() {
    let cluster = Cluster::start(1).await;
    let flow = cluster.notaries[0].flow.clone();
    let router = build_router(Arc::new(ApiState::new(flow.clone())));

    let (status, body) = get(&router, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["ledger_ok"], true);
    assert_eq!(body["chain_ok"], true);

    flow.health().set_chain_ok(false);
    let (_, body) = get(&router, "/ready").await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["chain_ok"], false);

    flow.health().set_chain_ok(true);
    let (_, body) = get(&router, "/ready").await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_starts_at_zero_counters() {
    let cluster = Cluster::start(1).await;
    let router = build_router(Arc::new(ApiState::new(cluster.notaries[0].flow.clone())));

    let (status, body) = get(&router, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["watched_addresses"], 0);
    assert_eq!(body["pending_deposits"], 0);
    assert_eq!(body["open_sessions"], 0);
    assert_eq!(body["open_withdrawals"], 0);
}
