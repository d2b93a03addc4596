//! Batch insert of joined statistics.

use crate::client::ClickHouseClient;
use chrono::NaiveDate;
use clickhouse::Row;
use pipeline_core::{Error, JoinedRow, Result, SinkBatch};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::debug;

/// Flattened row for the statistics table.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct RecallStatsRow {
    pub product_category: Option<String>,
    pub month: u16, // Date as days since epoch
    pub total_recalls: u64,
    pub total_high_risks: u64,
    pub total_compensations: u64,
    pub average_risk_length: Option<f64>,
    pub max_distributors: Option<u32>,
    pub min_distributors: Option<u32>,
    pub monthly_recalls: Option<u64>,
    pub monthly_high_risks: Option<u64>,
    pub batch_start_offset: i64,
    pub batch_end_offset: i64,
    pub computed_at: i64, // DateTime64(3) as milliseconds
}

/// Days since 1970-01-01, the wire format of ClickHouse `Date`.
pub fn date_to_days(date: NaiveDate) -> u16 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days().clamp(0, i64::from(u16::MAX)) as u16
}

/// Inverse of [`date_to_days`].
pub fn days_to_date(days: u16) -> NaiveDate {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    epoch + chrono::Duration::days(i64::from(days))
}

impl RecallStatsRow {
    pub fn from_joined(row: &JoinedRow, batch: &SinkBatch) -> Self {
        Self {
            product_category: row.product_category.clone(),
            month: date_to_days(row.month),
            total_recalls: row.total_recalls,
            total_high_risks: row.total_high_risks,
            total_compensations: row.total_compensations,
            average_risk_length: row.average_risk_length,
            max_distributors: row.max_distributors,
            min_distributors: row.min_distributors,
            monthly_recalls: row.monthly_recalls,
            monthly_high_risks: row.monthly_high_risks,
            batch_start_offset: batch.batch_start_offset,
            batch_end_offset: batch.batch_end_offset,
            computed_at: batch.computed_at.timestamp_millis(),
        }
    }
}

/// Appends one window's rows in a single INSERT.
///
/// Either every row of the batch is accepted or the call fails.
pub async fn insert_stats(client: &ClickHouseClient, batch: &SinkBatch) -> Result<usize> {
    if batch.is_empty() {
        return Ok(0);
    }

    let count = batch.len();
    let start = std::time::Instant::now();
    let table = client.config().qualified_table();

    let mut insert = client
        .inner()
        .insert(&table)
        .map_err(|e| Error::sink(format!("Insert error: {}", e)))?;

    for row in &batch.rows {
        insert
            .write(&RecallStatsRow::from_joined(row, batch))
            .await
            .map_err(|e| Error::sink(format!("Write error: {}", e)))?;
    }

    insert
        .end()
        .await
        .map_err(|e| Error::sink(format!("End error: {}", e)))?;

    let elapsed = start.elapsed();
    metrics().sink_latency_ms.observe(elapsed.as_millis() as u64);

    debug!(
        table = %table,
        count = count,
        batch_end_offset = batch.batch_end_offset,
        latency_ms = %elapsed.as_millis(),
        "Inserted recall statistics"
    );

    Ok(count)
}
