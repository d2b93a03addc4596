//! ClickHouse table schema for joined recall statistics.
//!
//! Append-only. Each window appends the cumulative statistics of every
//! (product_category, month) group it changed, stamped with the transport
//! offset range it consumed. The row with the latest `computed_at` for a
//! group holds that group's current totals; earlier rows are history.

/// DDL for the database.
pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {database}")
}

/// DDL for the joined statistics table.
pub fn create_stats_table(qualified_table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {qualified_table} (
    product_category Nullable(String),
    month Date,

    -- Windowed aggregation
    total_recalls UInt64,
    total_high_risks UInt64,
    total_compensations UInt64,
    average_risk_length Nullable(Float64),
    max_distributors Nullable(UInt32),
    min_distributors Nullable(UInt32),

    -- Monthly trend (left-joined)
    monthly_recalls Nullable(UInt64),
    monthly_high_risks Nullable(UInt64),

    -- Provenance
    batch_start_offset Int64,
    batch_end_offset Int64,
    computed_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(month)
ORDER BY (month, batch_end_offset)
SETTINGS index_granularity = 8192
"#
    )
}
