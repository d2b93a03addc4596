//! Operational HTTP surface for the recall pipeline.
//!
//! Health probes and a JSON metrics snapshot. The pipeline itself has no
//! request-driven entry point.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::{router, serve};
pub use state::AppState;
