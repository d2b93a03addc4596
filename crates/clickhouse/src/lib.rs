//! ClickHouse sink store for the recall pipeline.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod query;
pub mod schema;

pub use client::*;
pub use config::*;
pub use insert::{insert_stats, RecallStatsRow};
pub use query::*;
