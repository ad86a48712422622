//! Error types for scheduling and trace handling

use std::path::PathBuf;
use thiserror::Error;

/// The run this operation belongs to has terminated
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Execution canceled")]
pub struct Canceled;

/// A strategy could not follow the program
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Replay diverged at step {step}: {reason}")]
pub struct Divergence {
    pub step: usize,
    pub reason: String,
}

impl Divergence {
    pub fn new(step: usize, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }
}

/// Errors reading or writing an execution trace
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Trace I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed trace: {0}")]
    Format(#[from] serde_json::Error),
}

impl TraceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
