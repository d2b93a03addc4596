//! Worker-side configuration sections.

use crate::retry::BackoffPolicy;
use pipeline_core::{Error, Result, DEFAULT_CUTOFF_YEAR};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// RappelConso dataset on the French open-data portal.
pub const DEFAULT_SOURCE_ENDPOINT: &str =
    "https://data.economie.gouv.fr/api/explore/v2.1/catalog/datasets/rappelconso0/records";

/// Source API polling.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SourceConfig {
    #[validate(url)]
    pub endpoint: String,
    /// Page size; the API rejects anything above 100
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SOURCE_ENDPOINT.to_string(),
            limit: 10,
            poll_interval_secs: 60,
            request_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl SourceConfig {
    /// Rejects out-of-range settings before anything connects.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| Error::config(format!("source: {}", e)))?;
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_retries,
            Duration::from_millis(500),
            Duration::from_secs(10),
        )
    }
}

/// Locations of the two independent checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub ingest_path: PathBuf,
    pub sink_path: PathBuf,
    pub commit_max_retries: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            ingest_path: PathBuf::from("state/offset.json"),
            sink_path: PathBuf::from("state/sink_offset.json"),
            commit_max_retries: 3,
        }
    }
}

impl CheckpointConfig {
    pub fn commit_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.commit_max_retries,
            Duration::from_millis(100),
            Duration::from_secs(2),
        )
    }
}

/// Translation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// When false, text passes through untranslated
    pub enabled: bool,
    pub endpoint: String,
    pub project_id: String,
    pub location: String,
    pub access_token: Option<String>,
    pub source_language: String,
    pub target_language: String,
    pub timeout_ms: u64,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://translation.googleapis.com".to_string(),
            project_id: String::new(),
            location: "global".to_string(),
            access_token: None,
            source_language: "fr".to_string(),
            target_language: "en".to_string(),
            timeout_ms: 5_000,
            cache_capacity: 10_000,
            cache_ttl_secs: 3_600,
        }
    }
}

impl TranslationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Streaming aggregation side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Records published before this year are filtered out
    pub cutoff_year: i32,
    pub poll_interval_ms: u64,
    pub sink_max_retries: usize,
    pub sink_base_delay_ms: u64,
    pub sink_max_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            cutoff_year: DEFAULT_CUTOFF_YEAR,
            poll_interval_ms: 1_000,
            sink_max_retries: 5,
            sink_base_delay_ms: 500,
            sink_max_delay_ms: 30_000,
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sink_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.sink_max_retries,
            Duration::from_millis(self.sink_base_delay_ms),
            Duration::from_millis(self.sink_max_delay_ms),
        )
    }
}
