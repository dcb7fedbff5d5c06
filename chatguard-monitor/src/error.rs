//! Error types for chatguard-monitor
//!
//! Classifier failures are always recovered by the controller as "no alert
//! this cycle". Persistence failures are partial: the in-memory alert is kept
//! and the failure is reported. Only configuration errors are fatal, and only
//! at session construction.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure category of a classifier call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierErrorKind {
    Network,
    Timeout,
    MalformedResponse,
    UpstreamRejected,
}

/// Classifier call errors
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Classifier call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error("Classifier rejected request ({status}): {body}")]
    UpstreamRejected { status: u16, body: String },
}

impl ClassifierError {
    pub fn kind(&self) -> ClassifierErrorKind {
        match self {
            ClassifierError::Network(_) => ClassifierErrorKind::Network,
            ClassifierError::Timeout(_) => ClassifierErrorKind::Timeout,
            ClassifierError::MalformedResponse(_) => ClassifierErrorKind::MalformedResponse,
            ClassifierError::UpstreamRejected { .. } => ClassifierErrorKind::UpstreamRejected,
        }
    }
}

/// Alert store errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Partition or export file could not be read or written
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Existing partition file is not a valid alert array
    #[error("Corrupt alert partition {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to serialize alerts: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Monitoring session errors
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration rejected at session construction
    #[error("Configuration error: {0}")]
    Config(#[from] chatguard_common::Error),

    /// Message rejected before it reached the conversation log
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Operation on a session that has been stopped
    #[error("Monitoring session is stopped")]
    SessionStopped,

    /// Dispatch on a bridge that no longer accepts work
    #[error("Analysis bridge is stopped")]
    BridgeStopped,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Background runtime could not be created
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Convenience Result type for session operations
pub type Result<T> = std::result::Result<T, MonitorError>;
