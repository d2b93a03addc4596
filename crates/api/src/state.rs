//! Application state shared across handlers.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

#[derive(Debug)]
struct StateInner {
    service: String,
    version: String,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                service: service.into(),
                version: version.into(),
                started_at: Utc::now(),
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.inner.started_at).num_seconds().max(0)
    }
}
