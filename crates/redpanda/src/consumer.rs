//! Redpanda consumer delivering typed records in partition order.
//!
//! Offsets are managed by the caller: the stream worker passes the offset
//! it last durably checkpointed and commits `next_offset` only after the
//! window built from the batch has been written to the sink.

use crate::client::partition_client;
use crate::config::RedpandaConfig;
use async_trait::async_trait;
use pipeline_core::{Error, NormalizedRecord, Result};
use rskafka::client::partition::{OffsetAt, PartitionClient};
use std::sync::Arc;
use telemetry::{health, metrics};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One fetched micro-batch.
#[derive(Debug, Clone, Default)]
pub struct ConsumedBatch {
    /// Decoded records in arrival order
    pub records: Vec<NormalizedRecord>,
    /// Offset the fetch started from
    pub start_offset: i64,
    /// Offset to resume from once this batch is processed
    pub next_offset: i64,
    /// Messages dropped because they could not be decoded
    pub decode_errors: usize,
}

impl ConsumedBatch {
    /// True when the fetch returned no messages at all.
    pub fn is_empty(&self) -> bool {
        self.next_offset == self.start_offset
    }
}

/// Source of normalized records for the streaming side.
#[async_trait]
pub trait RecordStream: Send + Sync {
    async fn fetch_batch(&self, from_offset: i64) -> Result<ConsumedBatch>;

    /// Drops any cached connection after an error.
    async fn reset(&self) {}
}

/// Decodes one transport message.
pub fn decode_message(offset: i64, payload: &[u8]) -> Result<NormalizedRecord> {
    serde_json::from_slice(payload).map_err(|e| Error::Deserialize {
        offset,
        message: e.to_string(),
    })
}

/// Consumer for the normalized-record topic.
pub struct Consumer {
    config: RedpandaConfig,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
}

impl Consumer {
    pub fn new(config: RedpandaConfig) -> Self {
        info!(
            group_id = %config.consumer.group_id,
            topic = %config.topic,
            partition = config.partition,
            "Creating Redpanda consumer"
        );

        Self {
            config,
            partition_client: RwLock::new(None),
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = partition_client(&self.config).await?;
        *self.partition_client.write().await = Some(client.clone());
        Ok(client)
    }

    pub fn config(&self) -> &RedpandaConfig {
        &self.config
    }

    async fn fetch_from(&self, from_offset: i64) -> Result<ConsumedBatch> {
        let client = self.ensure_connected().await?;

        // Retention may have removed the checkpointed position
        let earliest = client
            .get_offset(OffsetAt::Earliest)
            .await
            .map_err(|e| Error::transport(format!("Failed to get offset: {}", e)))?;
        let start = if from_offset < earliest {
            warn!(
                checkpoint = from_offset,
                earliest = earliest,
                "Checkpoint is behind topic retention, resuming at earliest offset"
            );
            earliest
        } else {
            from_offset
        };

        let (fetched, _high_watermark) = client
            .fetch_records(
                start,
                1..self.config.consumer.max_batch_bytes,
                self.config.consumer.batch_timeout_ms,
            )
            .await
            .map_err(|e| Error::transport(format!("Failed to fetch records: {}", e)))?;

        let mut batch = ConsumedBatch {
            records: Vec::with_capacity(fetched.len()),
            start_offset: start,
            next_offset: start,
            decode_errors: 0,
        };

        for message in fetched {
            batch.next_offset = batch.next_offset.max(message.offset + 1);

            let Some(payload) = message.record.value else {
                batch.decode_errors += 1;
                warn!(offset = message.offset, "Dropping message without payload");
                continue;
            };

            match decode_message(message.offset, &payload) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    batch.decode_errors += 1;
                    warn!(offset = message.offset, error = %e, "Failed to deserialize record");
                }
            }
        }

        metrics().records_consumed.inc_by(batch.records.len() as u64);
        metrics()
            .deserialize_errors
            .inc_by(batch.decode_errors as u64);

        debug!(
            records = batch.records.len(),
            decode_errors = batch.decode_errors,
            offset_start = batch.start_offset,
            offset_next = batch.next_offset,
            "Fetched batch from Redpanda"
        );

        Ok(batch)
    }
}

#[async_trait]
impl RecordStream for Consumer {
    async fn fetch_batch(&self, from_offset: i64) -> Result<ConsumedBatch> {
        match self.fetch_from(from_offset).await {
            Ok(batch) => {
                health().redpanda.set_healthy();
                Ok(batch)
            }
            Err(e) => {
                health().redpanda.set_unhealthy(e.to_string());
                Err(e)
            }
        }
    }

    async fn reset(&self) {
        *self.partition_client.write().await = None;
        info!("Consumer connection reset");
    }
}
