//! `backupd-core`: shared data model, configuration and error types.
//!
//! Everything the other crates agree on lives here: period specifications,
//! storage targets, retention policies, and the resolved job definitions
//! produced from `backupd.toml`.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackupdConfig, JobBody, JobDefinition};
pub use error::{BackupdError, Result};
pub use types::{
    JobKindTag, LocalTarget, PeriodKind, PeriodSpec, RemoteKind, RemoteTarget, RetentionPolicy,
    TargetSet, TimeOfDay, Weekday,
};
