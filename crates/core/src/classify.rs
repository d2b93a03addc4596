//! Per-record derivations feeding both aggregators.
//!
//! Records are filtered on publication year and then classified once; the
//! resulting `ClassifiedRecord` snapshot is what both reducers read.

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::record::NormalizedRecord;

/// Records published before this year are excluded from aggregation.
pub const DEFAULT_CUTOFF_YEAR: i32 = 2023;

/// Descriptions longer than this many characters raise `high_risk_flag`.
pub const HIGH_RISK_LENGTH: usize = 100;

static HIGH_RISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)serious|severe|critical").expect("static high-risk pattern"));

static MEDIUM_RISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)moderate|medium").expect("static medium-risk pattern"));

/// Keyword-based risk level of a recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// A filtered record with its derived aggregation inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub reference_sheet: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub product_category: Option<String>,
    /// `category > sub_category`, nulls skipped
    pub category_hierarchy: Option<String>,
    pub publication_date: NaiveDate,
    /// First day of the publication month; the join key for both reducers
    pub month: NaiveDate,
    /// Character length of `risk_description`
    pub risk_length: Option<usize>,
    pub high_risk_flag: u8,
    pub risk_level: RiskLevel,
    pub is_compensation_provided: bool,
    /// Comma-separated entries in `distributors`
    pub num_distributors: Option<u32>,
}

impl ClassifiedRecord {
    /// (reference_sheet, version) identity, as on the normalized record.
    pub fn dedup_key(&self) -> Option<(&str, Option<&str>)> {
        self.reference_sheet
            .as_deref()
            .map(|sheet| (sheet, self.version.as_deref()))
    }

    /// (month, product_category) group both reducers key on.
    pub fn group_key(&self) -> GroupKey {
        (self.month, self.product_category.clone())
    }

    /// `"Yes"` / `"No"` rendering of the compensation flag.
    pub fn compensation_label(&self) -> &'static str {
        if self.is_compensation_provided {
            "Yes"
        } else {
            "No"
        }
    }
}

/// Aggregation group: month start, then category.
pub type GroupKey = (NaiveDate, Option<String>);

/// Truncates a date to the first day of its month.
///
/// The year is kept, so March 2023 and March 2024 are different groups.
/// Keying on the bare month number (1-12) would merge the same month
/// across years.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month following `month`.
pub fn next_month_start(month: NaiveDate) -> NaiveDate {
    let start = month_start(month);
    start.checked_add_months(Months::new(1)).unwrap_or(start)
}

/// High patterns are checked first; the first matching rule wins.
pub fn classify_risk(description: Option<&str>) -> RiskLevel {
    match description {
        Some(text) if HIGH_RISK.is_match(text) => RiskLevel::High,
        Some(text) if MEDIUM_RISK.is_match(text) => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Derives the aggregation inputs of one record.
///
/// Returns `None` when the record has no publication date, since such a
/// record can belong to no month.
pub fn classify(record: &NormalizedRecord) -> Option<ClassifiedRecord> {
    let publication_date = record.date_of_publication?;

    let risk_length = record
        .risk_description
        .as_deref()
        .map(|text| text.chars().count());

    let high_risk_flag = match risk_length {
        Some(len) if len > HIGH_RISK_LENGTH => 1,
        _ => 0,
    };

    let is_compensation_provided = record
        .compensation_methods
        .as_deref()
        .is_some_and(|text| !text.is_empty());

    let num_distributors = record
        .distributors
        .as_deref()
        .map(|text| text.split(',').count() as u32);

    let category_hierarchy = match (&record.product_category, &record.sub_category) {
        (Some(cat), Some(sub)) => Some(format!("{cat} > {sub}")),
        (cat, sub) => cat.clone().or_else(|| sub.clone()),
    };

    Some(ClassifiedRecord {
        reference_sheet: record.reference_sheet.clone(),
        version: record.version.clone(),
        product_category: record.product_category.clone(),
        category_hierarchy,
        publication_date,
        month: month_start(publication_date),
        risk_length,
        high_risk_flag,
        risk_level: classify_risk(record.risk_description.as_deref()),
        is_compensation_provided,
        num_distributors,
    })
}

/// Classifies one record if it is dated in or after `cutoff_year`.
pub fn classify_within(record: &NormalizedRecord, cutoff_year: i32) -> Option<ClassifiedRecord> {
    classify(record).filter(|r| r.publication_date.year() >= cutoff_year)
}

/// Keeps records published in or after `cutoff_year` and classifies them.
pub fn prepare(records: &[NormalizedRecord], cutoff_year: i32) -> Vec<ClassifiedRecord> {
    records
        .iter()
        .filter_map(|record| classify_within(record, cutoff_year))
        .collect()
}
