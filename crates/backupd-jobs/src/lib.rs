//! `backupd-jobs`: the backup job state machine.
//!
//! A [`Job`] fans one logical backup out to a primary local repository,
//! every secondary local repository and every remote repository, reporting
//! failures per target through the notification sink. Jobs plug into the
//! scheduler through [`backupd_scheduler::ScheduledJob`].

pub mod error;
pub mod job;
pub mod outcome;
pub mod services;
pub mod source;

pub use error::{JobError, Result};
pub use job::{build_jobs, Job, JobKind};
pub use outcome::{RunOutcome, TargetReport};
pub use services::Services;
pub use source::{ContainerSource, PlainSource, SourceBackup};
