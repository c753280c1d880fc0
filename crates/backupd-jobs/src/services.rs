use std::sync::Arc;
use std::time::Duration;

use backupd_core::config::BackupdConfig;
use backupd_host::{ContainerLifecycle, DeviceResolver, DockerCompose, Lsblk};
use backupd_notify::{LogSink, NotificationSink, NtfySink};
use backupd_transfer::{ResticCli, TransferBackend};

/// The collaborators every job talks to.
#[derive(Clone)]
pub struct Services {
    pub devices: Arc<dyn DeviceResolver>,
    pub transfer: Arc<dyn TransferBackend>,
    pub containers: Arc<dyn ContainerLifecycle>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Services {
    /// Production collaborators: lsblk, restic, docker compose and ntfy (or
    /// the log when no topic is configured).
    pub fn from_config(config: &BackupdConfig) -> Self {
        let timeout = Duration::from_secs(config.tools.timeout_secs);
        let notifier: Arc<dyn NotificationSink> = match config.ntfy {
            Some(ref ntfy) => Arc::new(NtfySink::new(ntfy)),
            None => Arc::new(LogSink),
        };
        Self {
            devices: Arc::new(Lsblk::new(&config.tools.lsblk, timeout)),
            transfer: Arc::new(ResticCli::new(&config.tools.restic, timeout)),
            containers: Arc::new(DockerCompose::new(&config.tools.docker, timeout)),
            notifier,
        }
    }
}
