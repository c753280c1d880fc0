//! Error types for the backupd-host crate.

use thiserror::Error;

/// All errors that can originate from host tool invocations.
#[derive(Debug, Error)]
pub enum HostError {
    /// The tool binary could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exceeded its time budget and was killed.
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    /// The tool ran but exited unsuccessfully.
    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Tool output could not be understood.
    #[error("unexpected output from {program}: {reason}")]
    Parse { program: String, reason: String },

    /// Underlying I/O failure while waiting for the child.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, HostError>;
