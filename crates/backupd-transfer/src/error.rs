use backupd_host::HostError;
use thiserror::Error;

/// Failures that stop a transfer operation from being attempted at all.
///
/// A tool that runs and reports failure is not an error at this level; its
/// message is returned in the operation's error list instead.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("backup tool unavailable: {0}")]
    Tool(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, TransferError>;
