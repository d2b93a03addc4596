//! Trend aggregator: tumbling one-month windows per category.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classify::{next_month_start, ClassifiedRecord};

/// Recall counts of one calendar-month window for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    /// Inclusive window start, first day of the month
    pub window_start: NaiveDate,
    /// Exclusive window end, first day of the next month
    pub window_end: NaiveDate,
    pub product_category: Option<String>,
    pub monthly_recalls: u64,
    pub monthly_high_risks: u64,
}

impl TrendRow {
    /// Join key month; identical to `AggregationRow::month` by construction.
    pub fn month(&self) -> NaiveDate {
        self.window_start
    }
}

/// Assigns each record to exactly one month window and counts per category.
///
/// Windows are materialized only when this is called; there is no
/// wall-clock triggering.
pub fn aggregate_trend(records: &[ClassifiedRecord]) -> Vec<TrendRow> {
    let mut windows: BTreeMap<(NaiveDate, Option<String>), (u64, u64)> = BTreeMap::new();

    for record in records {
        let counts = windows
            .entry((record.month, record.product_category.clone()))
            .or_default();
        if record.reference_sheet.is_some() {
            counts.0 += 1;
        }
        counts.1 += u64::from(record.high_risk_flag);
    }

    windows
        .into_iter()
        .map(|((window_start, product_category), (recalls, high_risks))| TrendRow {
            window_start,
            window_end: next_month_start(window_start),
            product_category,
            monthly_recalls: recalls,
            monthly_high_risks: high_risks,
        })
        .collect()
}
