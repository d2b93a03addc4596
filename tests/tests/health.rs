//! Tests for the operational HTTP surface.

use api::{router, AppState};
use axum::http::StatusCode;
use axum_test::TestServer;
use telemetry::{health, metrics};

fn server() -> TestServer {
    TestServer::new(router(AppState::new("recall-pipeline", "test")))
        .expect("Failed to create test server")
}

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let response = server().get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["service"], "recall-pipeline");
    assert_eq!(body["version"], "test");
    assert!(body.get("status").is_some());
    assert!(body.get("ready").is_some());
    assert!(body.get("ingest_offset").is_some());
    assert!(body.get("stream_offset").is_some());

    let names: Vec<&str> = body["components"]
        .as_array()
        .expect("components should be an array")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["source", "redpanda", "clickhouse"]);
}

/// Liveness does not depend on collaborators.
#[tokio::test]
async fn test_live_endpoint() {
    server().get("/health/live").await.assert_status_ok();
}

/// Readiness follows the transport and sink health.
#[tokio::test]
async fn test_ready_endpoint_follows_components() {
    let server = server();

    health().redpanda.set_unhealthy("broker down");
    health().clickhouse.set_healthy();
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["ready"], false);
    assert_ne!(body["status"], "healthy");

    health().redpanda.set_healthy();
    server.get("/health/ready").await.assert_status_ok();
}

/// /metrics returns the counter snapshot.
#[tokio::test]
async fn test_metrics_endpoint() {
    metrics().pages_fetched.inc();

    let response = server().get("/metrics").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert!(body["pages_fetched"].as_u64().unwrap() >= 1);
    assert!(body.get("records_published").is_some());
    assert!(body.get("sink_failures").is_some());
    assert!(body.get("timestamp").is_some());
}

/// Unknown routes are not served.
#[tokio::test]
async fn test_unknown_route() {
    server()
        .get("/ingest")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
