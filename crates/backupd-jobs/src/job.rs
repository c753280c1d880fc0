use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use backupd_core::config::{JobBody, JobDefinition};
use backupd_core::types::{LocalTarget, RetentionPolicy, TargetSet};
use backupd_host::{first_mount, MountTable};
use backupd_notify::Priority;
use backupd_scheduler::{PeriodPolicy, QueueFlag, RunStatus, RunSummary, ScheduledJob};
use backupd_transfer::Repository;
use futures_util::FutureExt;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{JobError, Result};
use crate::outcome::RunOutcome;
use crate::services::Services;
use crate::source::{ContainerSource, PlainSource, SourceBackup};

/// What a job does once its targets are known.
pub enum JobKind {
    /// Back up the source into the primary repository, then replicate.
    Backup {
        source: Box<dyn SourceBackup>,
        retention: RetentionPolicy,
    },
    /// Verify every repository independently; nothing is written.
    Check { deep: bool, subset: Option<String> },
}

impl From<JobBody> for JobKind {
    fn from(body: JobBody) -> Self {
        match body {
            JobBody::DataBackup {
                paths,
                excludes,
                retention,
            } => JobKind::Backup {
                source: Box::new(PlainSource { paths, excludes }),
                retention,
            },
            JobBody::ContainerBackup { paths, retention } => JobKind::Backup {
                source: Box::new(ContainerSource { paths }),
                retention,
            },
            JobBody::Check { read_data, subset } => JobKind::Check {
                deep: read_data,
                subset,
            },
        }
    }
}

/// One configured job, alive for the whole process.
pub struct Job {
    name: String,
    repo_name: String,
    source_root: PathBuf,
    password_file: PathBuf,
    targets: TargetSet,
    policy: PeriodPolicy,
    flag: QueueFlag,
    kind: JobKind,
    services: Services,
    cloud_enabled: bool,
}

/// Build every runnable job from resolved definitions.
pub fn build_jobs(
    definitions: Vec<JobDefinition>,
    services: &Services,
    cloud_enabled: bool,
) -> Vec<Arc<Job>> {
    definitions
        .into_iter()
        .map(|def| Arc::new(Job::new(def, services.clone(), cloud_enabled)))
        .collect()
}

fn error_title(count: usize, task: &str, name: &str, repo: &Repository) -> String {
    let prefix = if count > 1 { "Errors" } else { "An Error" };
    format!("[{prefix}] while running {task} {name} - {repo}")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Job {
    pub fn new(def: JobDefinition, services: Services, cloud_enabled: bool) -> Self {
        Self {
            name: def.name,
            repo_name: def.repo,
            source_root: def.root,
            password_file: def.password_file,
            targets: def.targets,
            policy: PeriodPolicy::new(def.period),
            flag: QueueFlag::new(),
            kind: def.body.into(),
            services,
            cloud_enabled,
        }
    }

    fn local_repo(&self, mounts: &MountTable, target: &LocalTarget) -> Option<Repository> {
        first_mount(mounts, &target.device_id)
            .map(|mount| Repository::local(mount, &self.repo_name, &self.password_file))
    }

    fn remote_repos(&self) -> Vec<Repository> {
        if !self.cloud_enabled {
            if !self.targets.cloud_repos.is_empty() {
                info!(job = %self.name, "cloud targets disabled for this run");
            }
            return Vec::new();
        }
        self.targets
            .cloud_repos
            .iter()
            .map(|remote| Repository::remote(remote, &self.repo_name, &self.password_file))
            .collect()
    }

    async fn notify(&self, title: &str, body: &str, priority: Priority) {
        self.services.notifier.notify(title, body, priority).await;
    }

    /// One HIGH notification listing `errors` when there are any.
    async fn report(&self, task: &str, repo: &Repository, errors: &[String]) {
        if errors.is_empty() {
            return;
        }
        let title = error_title(errors.len(), task, &self.name, repo);
        self.notify(&title, &errors.join("\n"), Priority::High).await;
    }

    /// Perform one run. Errors returned here escaped the per-target
    /// handling and are reported once by [`ScheduledJob::run`].
    pub async fn execute(&self) -> Result<RunOutcome> {
        let mounts = self.services.devices.list_mounts().await?;
        match self.kind {
            JobKind::Backup {
                ref source,
                ref retention,
            } => self.run_backup(&mounts, source.as_ref(), retention).await,
            JobKind::Check { deep, ref subset } => {
                self.run_check(&mounts, deep, subset.as_deref()).await
            }
        }
    }

    async fn run_backup(
        &self,
        mounts: &MountTable,
        source: &dyn SourceBackup,
        retention: &RetentionPolicy,
    ) -> Result<RunOutcome> {
        let transfer = &self.services.transfer;

        let Some(primary) = self.targets.primary() else {
            error!(job = %self.name, "no primary device found");
            self.notify(
                "Backup Failed",
                &format!("No primary device found for {}", self.name),
                Priority::High,
            )
            .await;
            return Err(JobError::NoPrimary);
        };

        let Some(primary_repo) = self.local_repo(mounts, primary) else {
            let msg = format!("Primary repo device {} is not mounted", primary.device_id);
            error!(job = %self.name, device = %primary.device_id, "primary device is not mounted");
            self.notify(
                &format!("Error backing up to primary repo for {}", self.name),
                &msg,
                Priority::High,
            )
            .await;
            return Err(JobError::PrimaryUnavailable {
                device_id: primary.device_id.clone(),
            });
        };

        let mut outcome = RunOutcome::default();

        let mut errors = transfer.init(&primary_repo).await?;
        errors.extend(transfer.unlock(&primary_repo).await?);
        errors.extend(
            source
                .perform_source_backup(&self.services, &self.source_root, &primary_repo)
                .await?,
        );
        errors.extend(transfer.prune(&primary_repo, retention).await?);
        self.report("backup task", &primary_repo, &errors).await;
        outcome.record(primary_repo.location(), errors);

        for target in self.targets.secondaries() {
            match self.local_repo(mounts, target) {
                Some(repo) => {
                    let errors = self.replicate(&primary_repo, &repo, retention).await;
                    outcome.record(repo.location(), errors);
                }
                None => {
                    let msg = format!("Local repo device {} is not mounted", target.device_id);
                    error!(job = %self.name, target = %target.name, device = %target.device_id, "secondary device is not mounted");
                    self.notify(
                        &format!("Error backing up to {} for {}", target.name, self.name),
                        &msg,
                        Priority::High,
                    )
                    .await;
                    outcome.record(target.name.as_str(), vec![msg]);
                }
            }
        }

        for repo in self.remote_repos() {
            let errors = self.replicate(&primary_repo, &repo, retention).await;
            outcome.record(repo.location(), errors);
        }

        if outcome.is_success() {
            self.notify(
                "Backup Complete",
                &format!("Backup completed for {}", self.name),
                Priority::Low,
            )
            .await;
        }
        Ok(outcome)
    }

    /// init → unlock → copy from primary → prune, reported as one target.
    /// An unexpected failure ends this target only.
    async fn replicate(
        &self,
        primary: &Repository,
        repo: &Repository,
        retention: &RetentionPolicy,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        if let Err(e) = self.replicate_steps(primary, repo, retention, &mut errors).await {
            error!(job = %self.name, target = %repo, error = %e, "replication stopped");
            errors.push(format!("Backup to {repo} stopped: {e}"));
        }
        self.report("backup task", repo, &errors).await;
        errors
    }

    async fn replicate_steps(
        &self,
        primary: &Repository,
        repo: &Repository,
        retention: &RetentionPolicy,
        errors: &mut Vec<String>,
    ) -> Result<()> {
        let transfer = &self.services.transfer;
        errors.extend(transfer.init(repo).await?);
        errors.extend(transfer.unlock(repo).await?);
        errors.extend(transfer.copy(primary, repo).await?);
        errors.extend(transfer.prune(repo, retention).await?);
        Ok(())
    }

    async fn run_check(
        &self,
        mounts: &MountTable,
        deep: bool,
        subset: Option<&str>,
    ) -> Result<RunOutcome> {
        let task = if deep { "read data check task" } else { "check task" };
        let mut outcome = RunOutcome::default();

        let mut repos = Vec::new();
        for target in &self.targets.local_devices {
            match self.local_repo(mounts, target) {
                Some(repo) => repos.push(repo),
                None => {
                    let msg = format!("Local repo device {} is not mounted", target.device_id);
                    error!(job = %self.name, target = %target.name, device = %target.device_id, "check target is not mounted");
                    self.notify(
                        &format!("Error while running {task} {}", self.name),
                        &msg,
                        Priority::High,
                    )
                    .await;
                    outcome.record(target.name.as_str(), vec![msg]);
                }
            }
        }
        repos.extend(self.remote_repos());

        for repo in repos {
            let errors = match self.services.transfer.verify(&repo, deep, subset).await {
                Ok(errors) => errors,
                Err(e) => {
                    error!(job = %self.name, target = %repo, error = %e, "check stopped");
                    vec![format!("Check for {repo} stopped: {e}")]
                }
            };
            self.report(task, &repo, &errors).await;
            outcome.record(repo.location(), errors);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl ScheduledJob for Job {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> &PeriodPolicy {
        &self.policy
    }

    fn queue_flag(&self) -> &QueueFlag {
        &self.flag
    }

    /// Run once, containing every failure. Never panics or returns an error
    /// to the worker.
    async fn run(&self) -> RunSummary {
        let span = info_span!("job", name = %self.name);
        async {
            info!("starting job");
            let result = AssertUnwindSafe(self.execute()).catch_unwind().await;
            let summary = match result {
                Ok(Ok(outcome)) => outcome.summary(),
                Ok(Err(e)) if e.is_primary_unavailable() => {
                    warn!(error = %e, "run aborted");
                    RunSummary {
                        status: RunStatus::Aborted,
                        error_count: 1,
                    }
                }
                Ok(Err(e)) => self.fail(e).await,
                Err(payload) => self.fail(JobError::Panicked(panic_message(&*payload))).await,
            };
            info!(status = %summary.status, errors = summary.error_count, "finished job");
            summary
        }
        .instrument(span)
        .await
    }
}

impl Job {
    async fn fail(&self, e: JobError) -> RunSummary {
        error!(error = %e, "unable to run backup");
        self.notify(
            "Backup Failed",
            &format!("Error occurred during backup for {}", self.name),
            Priority::High,
        )
        .await;
        match e {
            JobError::Panicked(_) => RunSummary::crashed(),
            _ => RunSummary {
                status: RunStatus::Failed,
                error_count: 1,
            },
        }
    }
}
