use backupd_host::HostError;
use backupd_transfer::TransferError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("no primary device configured")]
    NoPrimary,

    #[error("primary repo device {device_id} is not mounted")]
    PrimaryUnavailable { device_id: String },

    #[error("device lookup failed: {0}")]
    Devices(#[from] HostError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// The run was aborted because its primary target cannot be used. Already
    /// reported when it happens.
    pub fn is_primary_unavailable(&self) -> bool {
        matches!(self, JobError::NoPrimary | JobError::PrimaryUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
