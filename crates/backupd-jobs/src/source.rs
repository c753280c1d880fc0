use std::path::{Path, PathBuf};

use async_trait::async_trait;
use backupd_transfer::Repository;
use tracing::error;

use crate::error::Result;
use crate::services::Services;

/// How a backup job gets its source data into the primary repository.
#[async_trait]
pub trait SourceBackup: Send + Sync {
    /// Back up the data under `root` into `primary`, returning the
    /// operational errors encountered.
    async fn perform_source_backup(
        &self,
        services: &Services,
        root: &Path,
        primary: &Repository,
    ) -> Result<Vec<String>>;
}

/// Plain directories, snapshotted together in one backup.
pub struct PlainSource {
    pub paths: Vec<String>,
    pub excludes: Vec<PathBuf>,
}

#[async_trait]
impl SourceBackup for PlainSource {
    async fn perform_source_backup(
        &self,
        services: &Services,
        root: &Path,
        primary: &Repository,
    ) -> Result<Vec<String>> {
        let paths: Vec<PathBuf> = self.paths.iter().map(|p| root.join(p)).collect();
        Ok(services
            .transfer
            .backup(primary, &paths, &self.excludes)
            .await?)
    }
}

/// Container-backed application directories. Each application is stopped,
/// snapshotted and started again in turn.
pub struct ContainerSource {
    pub paths: Vec<String>,
}

#[async_trait]
impl SourceBackup for ContainerSource {
    async fn perform_source_backup(
        &self,
        services: &Services,
        root: &Path,
        primary: &Repository,
    ) -> Result<Vec<String>> {
        let mut errors = Vec::new();
        for path in &self.paths {
            let src = root.join(path);

            if let Err(e) = services.containers.stop(&src).await {
                error!(path = %src.display(), error = %e, "error while stopping container");
            }

            let backup = services
                .transfer
                .backup(primary, std::slice::from_ref(&src), &[])
                .await;

            // Restart even when the backup failed so the application is not
            // left down.
            if let Err(e) = services.containers.start(&src).await {
                error!(path = %src.display(), error = %e, "error while starting container");
            }

            errors.extend(backup?);
        }
        Ok(errors)
    }
}
