//! Window output and per-batch helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::aggregate_windowed;
use crate::classify::prepare;
use crate::join::{left_join, JoinedRow};
use crate::record::NormalizedRecord;
use crate::trend::aggregate_trend;

/// Cumulative rows of the groups one window touched, tagged with the
/// transport range the window consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkBatch {
    /// First transport offset consumed into this window
    pub batch_start_offset: i64,
    /// Offset to resume from once the batch is durably written
    pub batch_end_offset: i64,
    pub computed_at: DateTime<Utc>,
    pub rows: Vec<JoinedRow>,
}

impl SinkBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Keeps the last arrival of each (reference_sheet, version).
///
/// Records without a reference sheet cannot be identified and are kept.
/// Returns the surviving records in arrival order and the number dropped.
pub fn dedup_records(records: Vec<NormalizedRecord>) -> (Vec<NormalizedRecord>, usize) {
    use std::collections::HashMap;

    let mut last_seen: HashMap<(String, Option<String>), usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        if let Some((sheet, version)) = record.dedup_key() {
            last_seen.insert((sheet.to_string(), version.map(str::to_string)), i);
        }
    }

    let total = records.len();
    let kept: Vec<NormalizedRecord> = records
        .into_iter()
        .enumerate()
        .filter(|(i, record)| match record.dedup_key() {
            Some((sheet, version)) => {
                last_seen.get(&(sheet.to_string(), version.map(str::to_string))) == Some(i)
            }
            None => true,
        })
        .map(|(_, record)| record)
        .collect();

    let dropped = total - kept.len();
    (kept, dropped)
}

/// Filters, classifies, runs both reducers and joins them.
///
/// Sequential whole-set path. The stream worker gets the same rows by
/// running the two reducers concurrently over the accumulated records of
/// the groups each window touched.
pub fn compute_window(records: &[NormalizedRecord], cutoff_year: i32) -> Vec<JoinedRow> {
    let classified = prepare(records, cutoff_year);
    let aggregates = aggregate_windowed(&classified);
    let trends = aggregate_trend(&classified);
    left_join(aggregates, &trends)
}
