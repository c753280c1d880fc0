use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use backupd_core::types::RetentionPolicy;
use backupd_host::{HostError, ToolCommand};
use tracing::{debug, error, info, warn};

use crate::backend::TransferBackend;
use crate::error::Result;
use crate::repository::Repository;

/// [`TransferBackend`] that shells out to `restic`.
///
/// The target repository and its password file are handed over through
/// `RESTIC_REPOSITORY` / `RESTIC_PASSWORD_FILE`; remote credentials are added
/// to the child environment only.
pub struct ResticCli {
    program: String,
    timeout: Duration,
}

impl ResticCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn command(&self, repo: &Repository) -> ToolCommand {
        ToolCommand::new(&self.program, self.timeout)
            .env("RESTIC_REPOSITORY", repo.location())
            .env(
                "RESTIC_PASSWORD_FILE",
                repo.password_file().display().to_string(),
            )
            .envs(repo.env())
    }

    /// Run one restic invocation, turning tool failure into `failure`.
    async fn run_op(&self, cmd: ToolCommand, failure: String) -> Result<Vec<String>> {
        match cmd.run().await {
            Ok(out) if out.success() => {
                debug!(output = %out.stdout.trim(), "restic succeeded");
                Ok(Vec::new())
            }
            Ok(out) => {
                error!(code = out.exit_code, stderr = %out.stderr_excerpt(), "{failure}");
                Ok(vec![failure])
            }
            Err(HostError::Timeout { secs, .. }) => {
                let msg = format!("{failure} Timed out after {secs}s.");
                error!("{msg}");
                Ok(vec![msg])
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn backup_args(paths: &[PathBuf], excludes: &[PathBuf]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["backup".into()];
    args.extend(paths.iter().map(|p| p.as_os_str().to_owned()));
    for file in excludes {
        args.push("--exclude-file".into());
        args.push(file.as_os_str().to_owned());
    }
    args
}

pub(crate) fn copy_args(src: &Repository) -> Vec<OsString> {
    vec![
        "copy".into(),
        "--from-repo".into(),
        src.location().into(),
        "--from-password-file".into(),
        src.password_file().as_os_str().to_owned(),
    ]
}

pub(crate) fn prune_args(retention: &RetentionPolicy) -> Vec<OsString> {
    [
        "forget".to_string(),
        "--prune".to_string(),
        "--keep-daily".to_string(),
        retention.keep_daily.to_string(),
        "--keep-weekly".to_string(),
        retention.keep_weekly.to_string(),
        "--keep-monthly".to_string(),
        retention.keep_monthly.to_string(),
        "--keep-yearly".to_string(),
        retention.keep_yearly.to_string(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}

pub(crate) fn verify_args(deep: bool, subset: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["check".into()];
    match (deep, subset) {
        (true, Some(subset)) => args.push(format!("--read-data-subset={subset}").into()),
        (true, None) => args.push("--read-data".into()),
        (false, _) => {}
    }
    args
}

#[async_trait]
impl TransferBackend for ResticCli {
    async fn init(&self, repo: &Repository) -> Result<Vec<String>> {
        let probe = self.command(repo).args(["cat", "config"]).run().await;
        match probe {
            Ok(out) if out.success() => {
                debug!(repo = %repo, "repository already exists");
                return Ok(Vec::new());
            }
            Ok(_) | Err(HostError::Timeout { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let errors = self
            .run_op(
                self.command(repo).arg("init"),
                format!("Unable to initialize repo {repo}"),
            )
            .await?;
        if errors.is_empty() {
            warn!(repo = %repo, "repository created");
        }
        Ok(errors)
    }

    async fn unlock(&self, repo: &Repository) -> Result<Vec<String>> {
        self.run_op(
            self.command(repo).arg("unlock"),
            format!("Unable to unlock repo {repo}"),
        )
        .await
    }

    async fn backup(
        &self,
        repo: &Repository,
        paths: &[PathBuf],
        excludes: &[PathBuf],
    ) -> Result<Vec<String>> {
        info!(repo = %repo, paths = paths.len(), "running backup");
        let errors = self
            .run_op(
                self.command(repo).args(backup_args(paths, excludes)),
                format!("Backup for {repo} failed."),
            )
            .await?;
        if errors.is_empty() {
            info!(repo = %repo, "backup completed");
        }
        Ok(errors)
    }

    async fn copy(&self, src: &Repository, dst: &Repository) -> Result<Vec<String>> {
        info!(from = %src, to = %dst, "copying snapshots");
        let errors = self
            .run_op(
                self.command(dst).envs(src.env()).args(copy_args(src)),
                format!("Copy from {src} to {dst} failed."),
            )
            .await?;
        if errors.is_empty() {
            info!(from = %src, to = %dst, "copy completed");
        }
        Ok(errors)
    }

    async fn prune(&self, repo: &Repository, retention: &RetentionPolicy) -> Result<Vec<String>> {
        info!(repo = %repo, ?retention, "running cleanup");
        self.run_op(
            self.command(repo).args(prune_args(retention)),
            format!("Cleanup for {repo} failed."),
        )
        .await
    }

    async fn verify(
        &self,
        repo: &Repository,
        deep: bool,
        subset: Option<&str>,
    ) -> Result<Vec<String>> {
        info!(repo = %repo, deep, subset = ?subset, "checking repository");
        self.run_op(
            self.command(repo).args(verify_args(deep, subset)),
            format!("Check for {repo} failed."),
        )
        .await
    }
}
