//! Redpanda transport for the recall pipeline.
//!
//! One normalized record per message on a single named topic, keyed by
//! reference sheet. The consumer reads one partition in arrival order.

pub mod client;
pub mod config;
pub mod consumer;
pub mod health;
pub mod producer;

pub use config::*;
pub use consumer::*;
pub use producer::*;
