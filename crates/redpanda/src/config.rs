//! Redpanda configuration.

use serde::{Deserialize, Serialize};

/// Transport configuration shared by publisher and consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// Topic carrying normalized records
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Partition published to and consumed from
    #[serde(default)]
    pub partition: i32,
    /// SASL username (enables TLS + SCRAM-SHA-256 when set with password)
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Per-publish timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// Consumer-side fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Logical consumer name used in logs and checkpoint naming
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Upper bound on bytes fetched per micro-batch
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: i32,
    /// Max broker wait for a fetch in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: i32,
}

fn default_topic() -> String {
    "recall-notices".to_string()
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_group_id() -> String {
    "recall-aggregator".to_string()
}

fn default_max_batch_bytes() -> i32 {
    4 * 1024 * 1024
}

fn default_batch_timeout_ms() -> i32 {
    1000
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: default_topic(),
            partition: 0,
            sasl_username: None,
            sasl_password: None,
            compression: default_compression(),
            request_timeout_ms: default_request_timeout_ms(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            max_batch_bytes: default_max_batch_bytes(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// SASL credentials, if both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
