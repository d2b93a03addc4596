//! Windowed aggregator: grouped statistics per (category, month).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classify::{ClassifiedRecord, GroupKey};

/// Summary statistics of one (product_category, month) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRow {
    pub product_category: Option<String>,
    /// First day of the publication month, year included
    /// (see [`month_start`](crate::classify::month_start))
    pub month: NaiveDate,
    pub total_recalls: u64,
    pub total_high_risks: u64,
    pub total_compensations: u64,
    pub average_risk_length: Option<f64>,
    pub max_distributors: Option<u32>,
    pub min_distributors: Option<u32>,
}

#[derive(Default)]
struct GroupAcc {
    recalls: u64,
    high_risks: u64,
    compensations: u64,
    risk_length_sum: u64,
    risk_length_count: u64,
    max_distributors: Option<u32>,
    min_distributors: Option<u32>,
}

impl GroupAcc {
    fn add(&mut self, record: &ClassifiedRecord) {
        // count() semantics: null reference sheets are not counted
        if record.reference_sheet.is_some() {
            self.recalls += 1;
        }
        self.high_risks += u64::from(record.high_risk_flag);
        if record.is_compensation_provided {
            self.compensations += 1;
        }
        if let Some(len) = record.risk_length {
            self.risk_length_sum += len as u64;
            self.risk_length_count += 1;
        }
        if let Some(n) = record.num_distributors {
            self.max_distributors = Some(self.max_distributors.map_or(n, |m| m.max(n)));
            self.min_distributors = Some(self.min_distributors.map_or(n, |m| m.min(n)));
        }
    }

    fn finish(self, product_category: Option<String>, month: NaiveDate) -> AggregationRow {
        let average_risk_length = if self.risk_length_count == 0 {
            None
        } else {
            Some(self.risk_length_sum as f64 / self.risk_length_count as f64)
        };

        AggregationRow {
            product_category,
            month,
            total_recalls: self.recalls,
            total_high_risks: self.high_risks,
            total_compensations: self.compensations,
            average_risk_length,
            max_distributors: self.max_distributors,
            min_distributors: self.min_distributors,
        }
    }
}

/// Groups records by (product_category, month) and computes statistics.
///
/// Output is ordered by month ascending, then by category.
pub fn aggregate_windowed(records: &[ClassifiedRecord]) -> Vec<AggregationRow> {
    let mut groups: BTreeMap<GroupKey, GroupAcc> = BTreeMap::new();

    for record in records {
        groups
            .entry(record.group_key())
            .or_default()
            .add(record);
    }

    groups
        .into_iter()
        .map(|((month, category), acc)| acc.finish(category, month))
        .collect()
}
