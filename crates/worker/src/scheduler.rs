//! Runs the ingest loop and the stream worker side by side.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use pipeline_core::Result;

use crate::ingest::IngestLoop;
use crate::stream::StreamWorker;

/// Owns both long-running loops and their shared shutdown flag.
pub struct PipelineScheduler {
    ingest: Option<Arc<IngestLoop>>,
    stream: Option<Arc<StreamWorker>>,
}

/// Handles of spawned loops, by name.
pub type LoopHandles = Vec<(&'static str, JoinHandle<Result<()>>)>;

impl PipelineScheduler {
    pub fn new(ingest: Arc<IngestLoop>, stream: Arc<StreamWorker>) -> Self {
        Self {
            ingest: Some(ingest),
            stream: Some(stream),
        }
    }

    /// Scheduler running only the ingest side.
    pub fn ingest_only(ingest: Arc<IngestLoop>) -> Self {
        Self {
            ingest: Some(ingest),
            stream: None,
        }
    }

    /// Scheduler running only the streaming side.
    pub fn stream_only(stream: Arc<StreamWorker>) -> Self {
        Self {
            ingest: None,
            stream: Some(stream),
        }
    }

    /// Spawns every configured loop. Each exits after `shutdown` flips and
    /// its current unit of work is done, or on a fatal error.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> LoopHandles {
        let mut handles = Vec::new();

        if let Some(ref ingest) = self.ingest {
            let ingest = ingest.clone();
            let shutdown = shutdown.clone();
            handles.push((
                "ingest",
                tokio::spawn(async move { ingest.run(shutdown).await }),
            ));
            info!("Ingest loop started");
        }

        if let Some(ref stream) = self.stream {
            let stream = stream.clone();
            let shutdown = shutdown.clone();
            handles.push((
                "stream",
                tokio::spawn(async move { stream.run(shutdown).await }),
            ));
            info!("Stream worker started");
        }

        handles
    }
}

/// Waits for every loop. Returns the first fatal error, if any.
pub async fn join_all(handles: LoopHandles) -> Result<()> {
    let mut first_error = None;

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(())) => info!(worker = name, "Worker exited"),
            Ok(Err(e)) => {
                error!(worker = name, code = e.code(), error = %e, "Worker failed");
                first_error.get_or_insert(e);
            }
            Err(e) => {
                error!(worker = name, error = %e, "Worker task panicked");
                first_error.get_or_insert(pipeline_core::Error::internal(format!(
                    "{} task: {}",
                    name, e
                )));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
