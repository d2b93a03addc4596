//! Record publisher over rskafka.

use crate::client::{compression, partition_client};
use crate::config::RedpandaConfig;
use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::{Error, NormalizedRecord, Result};
use rskafka::client::partition::PartitionClient;
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, metrics};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Publishes one normalized record per transport message.
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    /// Publishes and waits for the broker acknowledgement.
    ///
    /// Returns the transport offset assigned to the message.
    async fn publish(&self, record: &NormalizedRecord) -> Result<i64>;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Encodes a record into a transport message keyed by reference sheet.
pub fn encode_message(record: &NormalizedRecord) -> Result<Record> {
    let payload = serde_json::to_vec(record)?;
    Ok(Record {
        key: record
            .reference_sheet
            .as_ref()
            .map(|sheet| sheet.as_bytes().to_vec()),
        value: Some(payload),
        headers: BTreeMap::new(),
        timestamp: Utc::now(),
    })
}

/// Redpanda-backed publisher.
pub struct Producer {
    config: RedpandaConfig,
    /// Cached partition client, dropped on failure
    client: RwLock<Option<Arc<PartitionClient>>>,
}

impl Producer {
    /// Creates a new producer. The connection is opened lazily.
    pub fn new(config: RedpandaConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    async fn get_client(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let partition = partition_client(&self.config).await?;
        *self.client.write().await = Some(partition.clone());
        Ok(partition)
    }

    async fn reset_connection(&self) {
        *self.client.write().await = None;
    }

    async fn produce(&self, record: &NormalizedRecord) -> Result<i64> {
        let message = encode_message(record)?;
        let client = self.get_client().await?;
        let timeout = Duration::from_millis(self.config.request_timeout_ms);

        let produced = tokio::time::timeout(
            timeout,
            client.produce(vec![message], compression(&self.config.compression)),
        )
        .await
        .map_err(|_| Error::transport(format!("produce timed out after {:?}", timeout)))?
        .map_err(|e| Error::transport(format!("Failed to produce: {}", e)))?;

        produced
            .first()
            .copied()
            .ok_or_else(|| Error::transport("broker returned no offset"))
    }
}

#[async_trait]
impl RecordPublisher for Producer {
    async fn publish(&self, record: &NormalizedRecord) -> Result<i64> {
        let start = std::time::Instant::now();

        match self.produce(record).await {
            Ok(offset) => {
                health().redpanda.set_healthy();
                metrics()
                    .publish_latency_ms
                    .observe(start.elapsed().as_millis() as u64);
                debug!(
                    topic = %self.config.topic,
                    offset = offset,
                    reference_sheet = record.reference_sheet.as_deref().unwrap_or("<none>"),
                    "Published record"
                );
                Ok(offset)
            }
            Err(e) => {
                warn!(error = %e, "Dropping cached partition client after publish failure");
                if matches!(e, Error::Transport(_)) {
                    health().redpanda.set_unhealthy(e.to_string());
                }
                self.reset_connection().await;
                Err(Error::publish(record.reference_sheet.as_deref(), e.to_string()))
            }
        }
    }
}
