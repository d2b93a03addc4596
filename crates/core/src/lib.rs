//! Core types, normalization and analytics for the recall pipeline.
//!
//! Everything here is pure: no I/O, no clocks, no shared state.

pub mod accumulate;
pub mod aggregate;
pub mod classify;
pub mod error;
pub mod join;
pub mod normalize;
pub mod record;
pub mod trend;
pub mod window;

pub use accumulate::*;
pub use aggregate::*;
pub use classify::*;
pub use error::{Error, ErrorClass, Result};
pub use join::*;
pub use normalize::{clean, merge};
pub use record::*;
pub use trend::*;
pub use window::*;
