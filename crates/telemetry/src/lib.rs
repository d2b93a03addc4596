//! Internal telemetry for the recall pipeline.
//!
//! Structured logs via `tracing`, in-process counters, and a component
//! health registry read by the operational HTTP surface.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
