use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupdError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job '{job}': {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupdError {
    pub(crate) fn job(job: &str, reason: impl Into<String>) -> Self {
        BackupdError::InvalidJob {
            job: job.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupdError>;
