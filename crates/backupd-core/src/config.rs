use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BackupdError, Result};
use crate::types::{JobKindTag, PeriodSpec, RetentionPolicy, TargetSet};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/backupd/backupd.toml";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_LOG_FILES: usize = 7;
pub const ENV_PREFIX: &str = "BACKUPD_";

/// Top-level config (backupd.toml + BACKUPD_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupdConfig {
    #[serde(default)]
    pub ntfy: Option<NtfyConfig>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default, alias = "default")]
    pub defaults: DefaultsConfig,
    #[serde(default, alias = "tasks")]
    pub jobs: BTreeMap<String, JobConfig>,
}

/// ntfy topic that receives run reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtfyConfig {
    pub topic_url: String,
    pub token: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// External binaries and the time budget for each invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_restic")]
    pub restic: String,
    #[serde(default = "default_docker")]
    pub docker: String,
    #[serde(default = "default_lsblk")]
    pub lsblk: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            restic: default_restic(),
            docker: default_docker(),
            lsblk: default_lsblk(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily-rolling log file. Console only when unset.
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_files: DEFAULT_LOG_FILES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// SQLite file recording every finished run. Disabled when unset.
    pub path: Option<PathBuf>,
}

/// Values inherited by jobs that do not set them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    #[serde(default, alias = "repo_roots")]
    pub targets: Option<TargetSet>,
    #[serde(default)]
    pub retention: Option<RetentionPolicy>,
}

/// One `[jobs.<name>]` table as written by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(alias = "type")]
    pub kind: JobKindTag,
    pub repo: String,
    pub root: PathBuf,
    #[serde(alias = "pw_file")]
    pub password_file: PathBuf,
    #[serde(default)]
    pub period: Option<PeriodSpec>,
    #[serde(default, alias = "repo_roots")]
    pub targets: Option<TargetSet>,
    #[serde(default)]
    pub retention: Option<RetentionPolicy>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<PathBuf>,
    #[serde(default)]
    pub read_data: bool,
    #[serde(default)]
    pub subset: Option<String>,
}

/// A fully resolved, validated job ready to be turned into a runnable job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub name: String,
    pub repo: String,
    pub root: PathBuf,
    pub password_file: PathBuf,
    pub period: PeriodSpec,
    pub targets: TargetSet,
    pub body: JobBody,
}

/// Kind-specific part of a [`JobDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobBody {
    DataBackup {
        paths: Vec<String>,
        excludes: Vec<PathBuf>,
        retention: RetentionPolicy,
    },
    ContainerBackup {
        paths: Vec<String>,
        retention: RetentionPolicy,
    },
    Check {
        read_data: bool,
        subset: Option<String>,
    },
}

impl JobBody {
    pub fn kind(&self) -> JobKindTag {
        match self {
            JobBody::DataBackup { .. } => JobKindTag::DataBackup,
            JobBody::ContainerBackup { .. } => JobKindTag::ContainerBackup,
            JobBody::Check { .. } => JobKindTag::Check,
        }
    }
}

fn default_restic() -> String {
    "restic".to_string()
}
fn default_docker() -> String {
    "docker".to_string()
}
fn default_lsblk() -> String {
    "lsblk".to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}
fn default_log_files() -> usize {
    DEFAULT_LOG_FILES
}

impl BackupdConfig {
    /// Load config from a TOML (or `.json`) file with BACKUPD_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore in env names, e.g.
    /// `BACKUPD_TOOLS__TIMEOUT_SECS=600`.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        if !path.exists() {
            return Err(BackupdError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let figment = if is_json {
            Figment::new().merge(Json::file(&path))
        } else {
            Figment::new().merge(Toml::file(&path))
        };

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| BackupdError::Config(e.to_string()))
    }

    /// Apply defaults and validate every job.
    ///
    /// The first invalid job aborts resolution; nothing is started from a
    /// partially valid configuration.
    pub fn resolve_jobs(&self) -> Result<Vec<JobDefinition>> {
        if self.jobs.is_empty() {
            return Err(BackupdError::Config("no jobs configured".to_string()));
        }
        self.jobs
            .iter()
            .map(|(name, job)| self.resolve_job(name, job))
            .collect()
    }

    fn resolve_job(&self, name: &str, job: &JobConfig) -> Result<JobDefinition> {
        let period = job
            .period
            .clone()
            .ok_or_else(|| BackupdError::job(name, "period must be specified"))?;
        period.validate().map_err(|e| BackupdError::job(name, e))?;

        let targets = job
            .targets
            .clone()
            .or_else(|| self.defaults.targets.clone())
            .ok_or_else(|| {
                BackupdError::job(name, "targets must be specified (or set in [defaults])")
            })?;
        targets.validate().map_err(|e| BackupdError::job(name, e))?;

        if job.repo.trim().is_empty() {
            return Err(BackupdError::job(name, "repo must not be empty"));
        }

        let body = match job.kind {
            JobKindTag::DataBackup | JobKindTag::ContainerBackup => {
                if job.read_data || job.subset.is_some() {
                    return Err(BackupdError::job(
                        name,
                        "read_data/subset are only valid for check jobs",
                    ));
                }
                if job.paths.is_empty() {
                    return Err(BackupdError::job(name, "backup jobs need at least one path"));
                }
                let retention = job.retention.or(self.defaults.retention).ok_or_else(|| {
                    BackupdError::job(
                        name,
                        "retention policy must be specified (or set in [defaults])",
                    )
                })?;
                if job.kind == JobKindTag::DataBackup {
                    JobBody::DataBackup {
                        paths: job.paths.clone(),
                        excludes: job.excludes.clone(),
                        retention,
                    }
                } else {
                    if !job.excludes.is_empty() {
                        return Err(BackupdError::job(
                            name,
                            "excludes are not supported for container backups",
                        ));
                    }
                    JobBody::ContainerBackup {
                        paths: job.paths.clone(),
                        retention,
                    }
                }
            }
            JobKindTag::Check => JobBody::Check {
                read_data: job.read_data,
                subset: job.subset.clone(),
            },
        };

        Ok(JobDefinition {
            name: name.to_string(),
            repo: job.repo.clone(),
            root: job.root.clone(),
            password_file: job.password_file.clone(),
            period,
            targets,
            body,
        })
    }
}
