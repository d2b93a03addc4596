//! Shared mocks, fixtures and wiring for the pipeline tests.

pub mod mocks;
