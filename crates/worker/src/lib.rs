//! Workers for the recall pipeline.
//!
//! - Ingest loop (source API → transform → Redpanda, offset checkpoint)
//! - Stream worker (Redpanda → aggregators → join → ClickHouse, sink checkpoint)
//! - Collaborator seams: source, translator, sink, checkpoint store

pub mod checkpoint;
pub mod config;
pub mod ingest;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod stream;
pub mod transform;
pub mod translate;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, StreamState, StreamStateStore};
pub use config::*;
pub use ingest::*;
pub use retry::BackoffPolicy;
pub use scheduler::*;
pub use sink::*;
pub use source::{RecordSource, SourceClient};
pub use stream::*;
pub use transform::RecordTransformer;
pub use translate::*;
