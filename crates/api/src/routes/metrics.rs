//! GET /metrics - in-process counters as JSON.

use axum::Json;
use telemetry::{metrics, MetricsSnapshot};

pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
