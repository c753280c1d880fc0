use std::path::PathBuf;

use async_trait::async_trait;
use backupd_core::types::RetentionPolicy;

use crate::error::Result;
use crate::repository::Repository;

/// Operations a job performs against snapshot repositories.
///
/// Every operation returns the list of operational failures it hit (empty on
/// success). `Err` is reserved for failures that make the backend itself
/// unusable, such as the tool binary being missing.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Create `repo` unless it already exists.
    async fn init(&self, repo: &Repository) -> Result<Vec<String>>;

    /// Remove stale locks left by an interrupted run.
    async fn unlock(&self, repo: &Repository) -> Result<Vec<String>>;

    /// Snapshot `paths` into `repo`.
    async fn backup(
        &self,
        repo: &Repository,
        paths: &[PathBuf],
        excludes: &[PathBuf],
    ) -> Result<Vec<String>>;

    /// Copy every snapshot of `src` missing from `dst`.
    async fn copy(&self, src: &Repository, dst: &Repository) -> Result<Vec<String>>;

    /// Forget snapshots outside `retention` and prune unreferenced data.
    async fn prune(&self, repo: &Repository, retention: &RetentionPolicy) -> Result<Vec<String>>;

    /// Check repository integrity. `deep` also reads pack data, optionally
    /// limited to `subset` (e.g. `"1/5"` or `"10%"`).
    async fn verify(
        &self,
        repo: &Repository,
        deep: bool,
        subset: Option<&str>,
    ) -> Result<Vec<String>>;
}
