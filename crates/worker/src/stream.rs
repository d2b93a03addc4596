//! Streaming side: consume → accumulate → aggregate → join → sink → checkpoint.
//!
//! Every fetched micro-batch is one window. Its records are folded into the
//! accumulated set, and the groups it touched are re-reduced over
//! everything accumulated so far, so each sink row carries a group's
//! running totals. The offset and the set are checkpointed together, only
//! after the window's rows are durably in the sink; a crash replays at most
//! the window that was in flight.

use crate::checkpoint::{StreamState, StreamStateStore};
use crate::config::{CheckpointConfig, StreamConfig};
use crate::retry::{retry, BackoffPolicy};
use crate::sink::{SinkAlignment, SinkWriter};
use chrono::Utc;
use pipeline_core::{
    aggregate_trend, aggregate_windowed, dedup_records, left_join, Error, ErrorClass, Result,
    SinkBatch,
};
use redpanda::RecordStream;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub cutoff_year: i32,
    /// Wait after an empty fetch or a transient error
    pub poll_interval: Duration,
    pub sink_policy: BackoffPolicy,
    pub checkpoint_policy: BackoffPolicy,
}

impl StreamSettings {
    pub fn new(stream: &StreamConfig, checkpoint: &CheckpointConfig) -> Self {
        Self {
            cutoff_year: stream.cutoff_year,
            poll_interval: stream.poll_interval(),
            sink_policy: stream.sink_policy(),
            checkpoint_policy: checkpoint.commit_policy(),
        }
    }
}

/// Summary of one completed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub start_offset: i64,
    pub next_offset: i64,
    pub consumed: usize,
    /// Redeliveries within the batch or of records already accumulated
    pub duplicates: usize,
    pub rows_written: usize,
    /// Records held in the accumulated set after this window
    pub accumulated: usize,
}

pub struct StreamWorker {
    stream: Arc<dyn RecordStream>,
    sink: Arc<dyn SinkWriter>,
    checkpoint: Arc<dyn StreamStateStore>,
    settings: StreamSettings,
    /// Committed state; `None` until loaded, and again after a failed window
    state: Mutex<Option<StreamState>>,
}

impl StreamWorker {
    pub fn new(
        stream: Arc<dyn RecordStream>,
        sink: Arc<dyn SinkWriter>,
        checkpoint: Arc<dyn StreamStateStore>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            stream,
            sink,
            checkpoint,
            settings,
            state: Mutex::new(None),
        }
    }

    /// Processes windows until `shutdown` flips to true. The window in
    /// flight is always finished first.
    ///
    /// Transient errors pause and retry; fatal ones (sink or checkpoint
    /// exhausted) stop the loop and are returned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            cutoff_year = self.settings.cutoff_year,
            sink_max_retries = self.settings.sink_policy.max_retries,
            "Stream worker starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.process_window().await {
                Ok(Some(report)) => {
                    debug!(
                        next_offset = report.next_offset,
                        rows = report.rows_written,
                        "Window done"
                    );
                    false
                }
                Ok(None) => true,
                Err(e) if e.class() == ErrorClass::Fatal => {
                    error!(code = e.code(), error = %e, "Stream worker halted");
                    return Err(e);
                }
                Err(e) => {
                    error!(code = e.code(), error = %e, "Window failed, retrying");
                    self.stream.reset().await;
                    true
                }
            };

            if pause {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Stream worker stopped");
        Ok(())
    }

    /// Consumes one micro-batch from the sink checkpoint and carries it all
    /// the way to a committed checkpoint. `None` when nothing was pending.
    pub async fn process_window(&self) -> Result<Option<WindowReport>> {
        let mut slot = self.state.lock().await;
        let mut state = match slot.take() {
            Some(state) => state,
            None => self.restore().await?,
        };

        // On error the slot stays empty and the next window reloads the
        // committed state, dropping anything this one folded in.
        let report = self.advance(&mut state).await?;
        *slot = Some(state);
        Ok(report)
    }

    /// Loads the committed state and checks it against the sink.
    async fn restore(&self) -> Result<StreamState> {
        let state = retry(&self.settings.checkpoint_policy, "stream state load", || {
            self.checkpoint.load_state()
        })
        .await?;

        let last_written = match self.sink.last_written_offset().await {
            Ok(last_written) => last_written,
            Err(e) => {
                warn!(error = %e, "Could not read sink high-water mark");
                None
            }
        };

        match SinkAlignment::compare(state.offset, last_written) {
            SinkAlignment::Empty | SinkAlignment::InSync => {}
            SinkAlignment::SinkAhead => warn!(
                checkpoint = state.offset,
                last_written = ?last_written,
                "Sink holds a window past the checkpoint; it will be written again"
            ),
            SinkAlignment::CheckpointAhead => info!(
                checkpoint = state.offset,
                last_written = ?last_written,
                "Checkpoint is past the last stored row; trailing windows wrote no rows"
            ),
        }

        info!(
            offset = state.offset,
            records = state.accumulated.len(),
            "Stream state restored"
        );
        Ok(state)
    }

    async fn advance(&self, state: &mut StreamState) -> Result<Option<WindowReport>> {
        // 1. Resume from the last durably written batch
        let from = i64::try_from(state.offset).map_err(|_| {
            Error::internal(format!("sink checkpoint {} exceeds i64", state.offset))
        })?;

        // 2. Fetch
        let batch = self.stream.fetch_batch(from).await?;
        if batch.is_empty() {
            return Ok(None);
        }

        // 3. Dedup within the batch, then fold into the accumulated set
        let consumed = batch.records.len();
        let (records, in_batch) = dedup_records(batch.records);
        let absorbed = state
            .accumulated
            .absorb(&records, self.settings.cutoff_year);
        let duplicates = in_batch + absorbed.duplicates;
        metrics().duplicates_dropped.inc_by(duplicates as u64);
        metrics().records_filtered.inc_by(absorbed.filtered as u64);

        // 4. Both reducers over the touched groups' records, then join
        let snapshot = Arc::new(state.accumulated.snapshot(&absorbed.touched));
        let windowed = {
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || aggregate_windowed(&snapshot))
        };
        let trend = {
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || aggregate_trend(&snapshot))
        };
        let (aggregates, trends) = tokio::try_join!(windowed, trend)
            .map_err(|e| Error::internal(format!("aggregation task failed: {}", e)))?;
        let rows = left_join(aggregates, &trends);

        let sink_batch = SinkBatch {
            batch_start_offset: batch.start_offset,
            batch_end_offset: batch.next_offset,
            computed_at: Utc::now(),
            rows,
        };

        // 5. Sink, then checkpoint offset and set together
        let rows_written = if sink_batch.is_empty() {
            0
        } else {
            self.write_with_retry(&sink_batch).await?
        };

        state.offset = batch.next_offset as u64;
        let committed: &StreamState = state;
        retry(&self.settings.checkpoint_policy, "stream state commit", || {
            self.checkpoint.commit_state(committed)
        })
        .await?;

        metrics().windows_completed.inc();
        metrics().stream_offset.set(state.offset);

        info!(
            start_offset = batch.start_offset,
            next_offset = batch.next_offset,
            consumed = consumed,
            duplicates = duplicates,
            replaced = absorbed.replaced,
            decode_errors = batch.decode_errors,
            groups = absorbed.touched.len(),
            rows = rows_written,
            accumulated = state.accumulated.len(),
            "Window written"
        );

        Ok(Some(WindowReport {
            start_offset: batch.start_offset,
            next_offset: batch.next_offset,
            consumed,
            duplicates,
            rows_written,
            accumulated: state.accumulated.len(),
        }))
    }

    /// Writes with capped exponential backoff. Exhaustion is fatal: the
    /// window's offsets must not be checkpointed without its rows.
    async fn write_with_retry(&self, batch: &SinkBatch) -> Result<usize> {
        let policy = self.settings.sink_policy;
        let mut attempt = 0;

        loop {
            match self.sink.write(batch).await {
                Ok(written) => {
                    metrics().rows_written.inc_by(written as u64);
                    return Ok(written);
                }
                Err(e) if attempt < policy.max_retries => {
                    let backoff = policy.delay_for_attempt(attempt);
                    attempt += 1;
                    metrics().sink_retries.inc();
                    warn!(
                        attempt = attempt,
                        max_retries = policy.max_retries,
                        backoff_ms = %backoff.as_millis(),
                        batch_end_offset = batch.batch_end_offset,
                        error = %e,
                        "Sink write failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    metrics().sink_failures.inc();
                    return Err(Error::SinkExhausted {
                        attempts: attempt + 1,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
