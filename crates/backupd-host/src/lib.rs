//! `backupd-host`: the host-side collaborators of a backup run.
//!
//! - [`exec::ToolCommand`]: bounded subprocess execution shared by every
//!   external tool (restic, docker, lsblk)
//! - [`devices::DeviceResolver`]: which block devices are mounted where
//! - [`containers::ContainerLifecycle`]: quiescing a container-backed data
//!   source around its backup

pub mod containers;
pub mod devices;
pub mod error;
pub mod exec;

pub use containers::{ContainerLifecycle, DockerCompose};
pub use devices::{first_mount, DeviceResolver, Lsblk, MountTable};
pub use error::{HostError, Result};
pub use exec::{ToolCommand, ToolOutput};
