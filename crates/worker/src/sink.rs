//! Analytical sink seam.

use async_trait::async_trait;
use clickhouse_client::{insert_stats, last_written_offset, ClickHouseClient};
use pipeline_core::{Result, SinkBatch};
use std::sync::Arc;
use telemetry::health;

/// Append-only store for joined window results.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Appends every row of `batch` or fails as a whole.
    async fn write(&self, batch: &SinkBatch) -> Result<usize>;

    /// Highest `batch_end_offset` already stored, `None` when empty.
    async fn last_written_offset(&self) -> Result<Option<i64>>;
}

/// How the sink's contents relate to the sink checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAlignment {
    /// Nothing written yet
    Empty,
    InSync,
    /// Rows past the checkpoint: the last window was written but not
    /// committed, and will be written again
    SinkAhead,
    /// Checkpoint past the last stored row. Expected when the latest
    /// windows produced no rows; otherwise rows were removed
    CheckpointAhead,
}

impl SinkAlignment {
    pub fn compare(checkpoint: u64, last_written: Option<i64>) -> Self {
        let Some(last_written) = last_written else {
            return Self::Empty;
        };
        match i128::from(last_written).cmp(&i128::from(checkpoint)) {
            std::cmp::Ordering::Equal => Self::InSync,
            std::cmp::Ordering::Greater => Self::SinkAhead,
            std::cmp::Ordering::Less => Self::CheckpointAhead,
        }
    }
}

/// Writes to the ClickHouse stats table.
pub struct ClickHouseSink {
    client: Arc<ClickHouseClient>,
}

impl ClickHouseSink {
    pub fn new(client: Arc<ClickHouseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SinkWriter for ClickHouseSink {
    async fn write(&self, batch: &SinkBatch) -> Result<usize> {
        match insert_stats(&self.client, batch).await {
            Ok(written) => {
                health().clickhouse.set_healthy();
                Ok(written)
            }
            Err(e) => {
                health().clickhouse.set_unhealthy(e.to_string());
                Err(e)
            }
        }
    }

    async fn last_written_offset(&self) -> Result<Option<i64>> {
        last_written_offset(&self.client).await
    }
}
