use std::path::PathBuf;

use thiserror::Error;

/// Failures observed by the telemetry pipeline.
///
/// None of these are fatal to the process. They are logged and forwarded to
/// subscribers as values, which is why every variant carries owned strings
/// rather than the source error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    /// Opening the TCP connection failed or timed out. The user retries manually.
    #[error("connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    /// A read failed mid-stream. The receive loop has terminated.
    #[error("telemetry read failed: {0}")]
    Io(String),

    /// One frame could not be decoded. The frame is skipped.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// A partial frame grew past the configured limit and was discarded.
    #[error("frame exceeded {limit} bytes and was discarded")]
    FrameTooLong { limit: usize },

    /// An external notifier program could not be started.
    #[error("failed to launch {}: {reason}", path.display())]
    Launch { path: PathBuf, reason: String },

    /// Reading or writing durable state failed.
    #[error("persistence error on {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },
}

impl MonitorError {
    pub fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Decode problems leave the receive loop running; everything else
    /// reported by the receiver ends it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MonitorError::Io(_) | MonitorError::Connection { .. })
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
