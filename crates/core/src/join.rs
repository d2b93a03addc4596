//! Left join of windowed statistics with monthly trend counts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::aggregate::AggregationRow;
use crate::trend::TrendRow;

/// An aggregation row extended with its trend counts, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub product_category: Option<String>,
    pub month: NaiveDate,
    pub total_recalls: u64,
    pub total_high_risks: u64,
    pub total_compensations: u64,
    pub average_risk_length: Option<f64>,
    pub max_distributors: Option<u32>,
    pub min_distributors: Option<u32>,
    pub monthly_recalls: Option<u64>,
    pub monthly_high_risks: Option<u64>,
}

impl JoinedRow {
    fn new(row: AggregationRow, trend: Option<&TrendRow>) -> Self {
        Self {
            product_category: row.product_category,
            month: row.month,
            total_recalls: row.total_recalls,
            total_high_risks: row.total_high_risks,
            total_compensations: row.total_compensations,
            average_risk_length: row.average_risk_length,
            max_distributors: row.max_distributors,
            min_distributors: row.min_distributors,
            monthly_recalls: trend.map(|t| t.monthly_recalls),
            monthly_high_risks: trend.map(|t| t.monthly_high_risks),
        }
    }
}

/// Left-joins on (product_category, month).
///
/// Every aggregation row appears exactly once, in input order. A null
/// category never matches, as in SQL equality.
pub fn left_join(aggregates: Vec<AggregationRow>, trends: &[TrendRow]) -> Vec<JoinedRow> {
    let index: HashMap<(&str, NaiveDate), &TrendRow> = trends
        .iter()
        .filter_map(|t| {
            t.product_category
                .as_deref()
                .map(|category| ((category, t.month()), t))
        })
        .collect();

    aggregates
        .into_iter()
        .map(|row| {
            let trend = row
                .product_category
                .as_deref()
                .and_then(|category| index.get(&(category, row.month)).copied());
            JoinedRow::new(row, trend)
        })
        .collect()
}
