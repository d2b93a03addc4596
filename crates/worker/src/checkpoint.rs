//! Durable offset checkpoints.
//!
//! A checkpoint is a single JSON object `{"offset": N}` at a well-known
//! path. Commits go through a temp file in the same directory followed by a
//! rename, so a reader sees either the previous value or the new one, never
//! a truncated file.
//!
//! The sink checkpoint also carries the stream worker's accumulated record
//! set, so the offset and the aggregates it covers are committed in the
//! same rename and can never disagree.
//!
//! Only one loop may own a given checkpoint path. The store does not take a
//! lock on the file; callers must not point two processes at the same path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline_core::{AccumulatedSet, Error, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Persists and retrieves the last processed offset.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last committed offset, or 0 on a cold start.
    async fn load(&self) -> Result<u64>;

    /// Atomically persists `offset`. Lower values than the last commit are
    /// rejected.
    async fn commit(&self, offset: u64) -> Result<()>;
}

/// Sink offset together with the accumulated set that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    /// Next transport offset to consume
    pub offset: u64,
    pub accumulated: AccumulatedSet,
}

/// Persists the stream worker's position and aggregation state as one unit.
#[async_trait]
pub trait StreamStateStore: Send + Sync {
    /// Last committed state, or an empty set at offset 0 on a cold start.
    async fn load_state(&self) -> Result<StreamState>;

    /// Atomically persists `state`. Offsets lower than the last commit are
    /// rejected.
    async fn commit_state(&self, state: &StreamState) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct CheckpointFile {
    offset: u64,
    #[serde(default)]
    accumulated: Option<AccumulatedSet>,
}

#[derive(Serialize)]
struct CheckpointFileRef<'a> {
    offset: u64,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accumulated: Option<&'a AccumulatedSet>,
}

/// File-backed checkpoint.
pub struct FileCheckpointStore {
    path: PathBuf,
    /// Last value known to be on disk; also serializes commits.
    committed: Mutex<Option<u64>>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            committed: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    /// `None` for a missing or corrupt file.
    async fn read_file(&self) -> Result<Option<CheckpointFile>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No checkpoint found, starting from 0");
                return Ok(None);
            }
            Err(e) => return Err(Error::checkpoint(self.path_str(), e.to_string())),
        };

        match serde_json::from_slice::<CheckpointFile>(&bytes) {
            Ok(file) => Ok(Some(file)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt checkpoint, treating as cold start"
                );
                Ok(None)
            }
        }
    }

    async fn read_offset(&self) -> Result<u64> {
        Ok(self.read_file().await?.map_or(0, |file| file.offset))
    }

    /// Rejects `offset` if it is below the last durable value.
    async fn check_monotonic(&self, committed: Option<u64>, offset: u64) -> Result<()> {
        let current = match committed {
            Some(known) => known,
            None => self.read_offset().await?,
        };

        if offset < current {
            return Err(Error::CheckpointRegression {
                committed: current,
                requested: offset,
            });
        }
        Ok(())
    }

    async fn write_atomic(&self, offset: u64, accumulated: Option<&AccumulatedSet>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::checkpoint(self.path_str(), e.to_string()))?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        let temp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let payload = serde_json::to_vec(&CheckpointFileRef {
            offset,
            updated_at: Utc::now(),
            accumulated,
        })?;

        let write = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&payload).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, &self.path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::checkpoint(self.path_str(), e.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<u64> {
        let mut committed = self.committed.lock().await;
        let offset = self.read_offset().await?;
        // Never report less than what this process already made durable.
        let offset = committed.map_or(offset, |known| known.max(offset));
        *committed = Some(offset);
        Ok(offset)
    }

    async fn commit(&self, offset: u64) -> Result<()> {
        let mut committed = self.committed.lock().await;
        self.check_monotonic(*committed, offset).await?;

        self.write_atomic(offset, None).await?;
        *committed = Some(offset);
        debug!(path = %self.path.display(), offset = offset, "Checkpoint committed");
        Ok(())
    }
}

#[async_trait]
impl StreamStateStore for FileCheckpointStore {
    async fn load_state(&self) -> Result<StreamState> {
        let mut committed = self.committed.lock().await;
        let Some(file) = self.read_file().await? else {
            return Ok(StreamState::default());
        };

        let accumulated = match file.accumulated {
            Some(accumulated) => accumulated,
            None => {
                if file.offset > 0 {
                    warn!(
                        path = %self.path.display(),
                        offset = file.offset,
                        "Checkpoint has no aggregation state; groups restart from records after this offset"
                    );
                }
                AccumulatedSet::default()
            }
        };

        *committed = Some(committed.map_or(file.offset, |known| known.max(file.offset)));
        Ok(StreamState {
            offset: file.offset,
            accumulated,
        })
    }

    async fn commit_state(&self, state: &StreamState) -> Result<()> {
        let mut committed = self.committed.lock().await;
        self.check_monotonic(*committed, state.offset).await?;

        self.write_atomic(state.offset, Some(&state.accumulated)).await?;
        *committed = Some(state.offset);
        debug!(
            path = %self.path.display(),
            offset = state.offset,
            records = state.accumulated.len(),
            "Stream state committed"
        );
        Ok(())
    }
}
