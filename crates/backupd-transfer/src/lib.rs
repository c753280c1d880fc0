//! `backupd-transfer`: moving snapshots between repositories.
//!
//! [`TransferBackend`] is the seam the job state machine talks to;
//! [`ResticCli`] implements it by driving the `restic` binary.

pub mod backend;
pub mod error;
pub mod repository;
pub mod restic;

pub use backend::TransferBackend;
pub use error::{Result, TransferError};
pub use repository::Repository;
pub use restic::ResticCli;
