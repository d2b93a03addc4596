//! Unified error types for the recall pipeline.
//!
//! Every error belongs to one class of the failure taxonomy:
//! - Transient: retried with backoff, degrades or escalates per caller
//! - PerRecord: logged, the unit is dropped, the batch proceeds
//! - Fatal: the owning loop halts and needs an operator

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    PerRecord,
    Fatal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::PerRecord => "per_record",
            Self::Fatal => "fatal",
        }
    }
}

/// Unified error type for the recall pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Source API request failed or returned an unusable page.
    #[error("[SRC_001] source fetch failed: {0}")]
    Source(String),

    /// Translation collaborator failed (timeout, quota, malformed response).
    #[error("[TRN_001] translation failed: {0}")]
    Translation(String),

    /// A single record could not be published to the transport.
    #[error("[PUB_001] publish failed for {reference_sheet}: {message}")]
    Publish {
        reference_sheet: String,
        message: String,
    },

    /// Transport-level failure (connect, fetch).
    #[error("[PUB_002] transport error: {0}")]
    Transport(String),

    /// A single transport message could not be decoded.
    #[error("[DESER_001] message at offset {offset} could not be decoded: {message}")]
    Deserialize { offset: i64, message: String },

    /// Checkpoint store could not be read or written.
    #[error("[CKPT_001] checkpoint {path}: {message}")]
    Checkpoint { path: String, message: String },

    /// Attempt to move a checkpoint backwards.
    #[error("[CKPT_002] checkpoint regression: committed {committed}, requested {requested}")]
    CheckpointRegression { committed: u64, requested: u64 },

    /// Sink store rejected a write.
    #[error("[SINK_001] sink write failed: {0}")]
    Sink(String),

    /// Sink writes kept failing after every retry was spent.
    #[error("[SINK_002] sink unavailable after {attempts} attempts: {message}")]
    SinkExhausted { attempts: usize, message: String },

    #[error("[CFG_001] invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn source_fetch(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation(msg.into())
    }

    pub fn publish(reference_sheet: Option<&str>, msg: impl Into<String>) -> Self {
        Self::Publish {
            reference_sheet: reference_sheet.unwrap_or("<none>").to_string(),
            message: msg.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn checkpoint(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Checkpoint {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Failure class used to decide between retry, skip and halt.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Source(_) | Self::Translation(_) | Self::Transport(_) | Self::Sink(_) => {
                ErrorClass::Transient
            }
            Self::Publish { .. } | Self::Deserialize { .. } | Self::Serialization(_) => {
                ErrorClass::PerRecord
            }
            Self::Checkpoint { .. }
            | Self::CheckpointRegression { .. }
            | Self::SinkExhausted { .. }
            | Self::Config(_)
            | Self::Internal(_) => ErrorClass::Fatal,
        }
    }

    /// Stable error code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Source(_) => "SRC_001",
            Self::Translation(_) => "TRN_001",
            Self::Publish { .. } => "PUB_001",
            Self::Transport(_) => "PUB_002",
            Self::Deserialize { .. } => "DESER_001",
            Self::Checkpoint { .. } => "CKPT_001",
            Self::CheckpointRegression { .. } => "CKPT_002",
            Self::Sink(_) => "SINK_001",
            Self::SinkExhausted { .. } => "SINK_002",
            Self::Config(_) => "CFG_001",
            Self::Serialization(_) => "DESER_002",
            Self::Internal(_) => "INT_001",
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
