//! Offset-tracked incremental ingester.
//!
//! Each iteration walks FETCH → TRANSFORM_PUBLISH → CHECKPOINT and then
//! idles. The offset is read from the checkpoint store at the start of
//! every iteration and committed only after every record of the page was
//! either published or explicitly skipped.

use crate::checkpoint::CheckpointStore;
use crate::config::{CheckpointConfig, SourceConfig};
use crate::retry::{retry, BackoffPolicy};
use crate::source::RecordSource;
use crate::transform::RecordTransformer;
use pipeline_core::{RawRecord, Result};
use redpanda::RecordPublisher;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Page size requested from the source and the checkpoint stride
    pub limit: u32,
    pub poll_interval: Duration,
    /// Retry policy for checkpoint reads and commits
    pub checkpoint_policy: BackoffPolicy,
}

impl IngestSettings {
    pub fn new(source: &SourceConfig, checkpoint: &CheckpointConfig) -> Self {
        Self {
            limit: source.limit,
            poll_interval: source.poll_interval(),
            checkpoint_policy: checkpoint.commit_policy(),
        }
    }
}

/// Result of one processed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub offset: u64,
    pub next_offset: u64,
    pub fetched: usize,
    pub published: usize,
    pub skipped: usize,
}

/// What a single iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// The source had nothing at this offset; the checkpoint is unchanged.
    Empty { offset: u64 },
    /// The fetch failed; it is retried on the next tick.
    FetchFailed { offset: u64 },
    Page(PageReport),
}

pub struct IngestLoop {
    source: Arc<dyn RecordSource>,
    transformer: RecordTransformer,
    publisher: Arc<dyn RecordPublisher>,
    checkpoint: Arc<dyn CheckpointStore>,
    settings: IngestSettings,
}

impl IngestLoop {
    pub fn new(
        source: Arc<dyn RecordSource>,
        transformer: RecordTransformer,
        publisher: Arc<dyn RecordPublisher>,
        checkpoint: Arc<dyn CheckpointStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            transformer,
            publisher,
            checkpoint,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Runs until `shutdown` flips to true. A page in progress always
    /// completes before the loop exits.
    ///
    /// Returns an error only when the checkpoint store stays unusable
    /// after retries.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            limit = self.settings.limit,
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Ingest loop starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_once().await {
                error!(code = e.code(), error = %e, "Ingest loop halted");
                return Err(e);
            }

            // IDLE_WAIT
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Ingest loop stopped");
        Ok(())
    }

    /// One FETCH → TRANSFORM_PUBLISH → CHECKPOINT pass, without the idle wait.
    pub async fn run_once(&self) -> Result<Iteration> {
        let policy = self.settings.checkpoint_policy;
        let limit = self.settings.limit;

        // FETCH
        let offset = retry(&policy, "checkpoint load", || self.checkpoint.load()).await?;
        metrics().ingest_offset.set(offset);

        let page = match self.source.fetch_page(offset, limit).await {
            Ok(page) => page,
            Err(e) => {
                metrics().fetch_errors.inc();
                error!(offset = offset, error = %e, "Source fetch failed, retrying next tick");
                return Ok(Iteration::FetchFailed { offset });
            }
        };

        if page.is_empty() {
            metrics().empty_polls.inc();
            debug!(offset = offset, "Empty page, offset unchanged");
            return Ok(Iteration::Empty { offset });
        }
        metrics().pages_fetched.inc();

        // TRANSFORM_PUBLISH
        let published = self.transform_publish(&page).await;
        let skipped = page.len() - published;

        // CHECKPOINT
        let next_offset = offset + u64::from(limit);
        if page.len() < limit as usize {
            warn!(
                offset = offset,
                returned = page.len(),
                limit = limit,
                next_offset = next_offset,
                "Partial page, advancing by full limit"
            );
        }

        retry(&policy, "checkpoint commit", || {
            self.checkpoint.commit(next_offset)
        })
        .await?;
        metrics().checkpoint_commits.inc();
        metrics().ingest_offset.set(next_offset);

        info!(
            offset = offset,
            next_offset = next_offset,
            fetched = page.len(),
            published = published,
            skipped = skipped,
            "Page ingested"
        );

        Ok(Iteration::Page(PageReport {
            offset,
            next_offset,
            fetched: page.len(),
            published,
            skipped,
        }))
    }

    /// Transforms and publishes every record; returns how many were
    /// acknowledged. Failed records are logged and dropped.
    async fn transform_publish(&self, page: &[RawRecord]) -> usize {
        let mut published = 0;

        for raw in page {
            let record = self.transformer.transform(raw).await;
            match self.publisher.publish(&record).await {
                Ok(transport_offset) => {
                    published += 1;
                    metrics().records_published.inc();
                    debug!(
                        reference_sheet = record.reference_sheet.as_deref().unwrap_or("<none>"),
                        transport_offset = transport_offset,
                        "Record published"
                    );
                }
                Err(e) => {
                    metrics().publish_errors.inc();
                    warn!(
                        reference_sheet = record.reference_sheet.as_deref().unwrap_or("<none>"),
                        code = e.code(),
                        error = %e,
                        "Publish failed, record skipped"
                    );
                }
            }
        }

        published
    }
}
