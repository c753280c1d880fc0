use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error from the run history.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored run row could not be decoded.
    #[error("Invalid run record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
