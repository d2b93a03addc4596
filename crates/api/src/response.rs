//! Response bodies.

use serde::{Deserialize, Serialize};
use telemetry::ComponentHealthReport;

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: i64,
    pub ready: bool,
    pub components: Vec<ComponentHealthReport>,
    pub ingest_offset: u64,
    pub stream_offset: u64,
}
