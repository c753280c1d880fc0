use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use backupd_core::config::{BackupdConfig, JobDefinition};
use backupd_core::BackupdError;
use backupd_jobs::{build_jobs, Services};
use backupd_notify::Priority;
use backupd_scheduler::{ExecutionQueue, JobRef, RunHistory, SchedulerEngine, Worker};
use clap::Parser;
use tracing::{error, info, warn};

mod logging;

#[derive(Parser)]
#[command(name = "backupd")]
#[command(about = "Scheduled restic backups to local and cloud repositories")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, default_value = backupd_core::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,

    /// Run the selected jobs once, one after another, and exit
    #[arg(long)]
    immediate: bool,

    /// Skip cloud targets for every run of this process
    #[arg(long)]
    no_cloud: bool,

    /// Only run these jobs
    #[arg(short = 't', long = "jobs", num_args = 1..)]
    jobs: Vec<String>,

    /// Check the configuration, print the resolved jobs and exit
    #[arg(long)]
    validate: bool,

    /// Print the N most recent runs from the history database and exit
    #[arg(long, value_name = "N")]
    history: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = BackupdConfig::load(Some(cli.config.as_path())).context("loading configuration")?;
    let _log_guard = logging::init(&config.logging, cli.debug)?;

    if let Some(limit) = cli.history {
        return print_history(&config, limit);
    }

    let services = Services::from_config(&config);
    let definitions = match config
        .resolve_jobs()
        .and_then(|defs| select_jobs(defs, &cli.jobs))
    {
        Ok(defs) => defs,
        Err(e) => {
            error!(error = %e, "unable to load jobs");
            if config.ntfy.is_some() {
                services
                    .notifier
                    .notify("Backup Failed", "Unable to load jobs", Priority::High)
                    .await;
            }
            return Err(e.into());
        }
    };

    if cli.validate {
        print_summary(&definitions);
        return Ok(());
    }

    let history = match config.history.path {
        Some(ref path) => Some(RunHistory::open(path).context("opening run history")?),
        None => None,
    };
    let jobs: Vec<JobRef> = build_jobs(definitions, &services, !cli.no_cloud)
        .into_iter()
        .map(|job| job as JobRef)
        .collect();
    let (queue, rx) = ExecutionQueue::new();
    let worker = Worker::new(rx, history);

    if cli.immediate {
        info!(jobs = jobs.len(), "running jobs immediately");
        for job in jobs {
            worker.execute(job).await;
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = SchedulerEngine::new(jobs, queue);
    let engine_handle = tokio::spawn(engine.run(shutdown_rx.clone()));
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    shutdown_signal().await;
    info!("shutdown requested; waiting for the running job to finish");
    let _ = shutdown_tx.send(true);
    if let Err(e) = engine_handle.await {
        warn!(error = %e, "scheduler engine task failed");
    }
    if let Err(e) = worker_handle.await {
        warn!(error = %e, "worker task failed");
    }
    Ok(())
}

/// Keep only the jobs named on the command line (all when none are named).
fn select_jobs(
    definitions: Vec<JobDefinition>,
    names: &[String],
) -> backupd_core::Result<Vec<JobDefinition>> {
    if names.is_empty() {
        return Ok(definitions);
    }
    let known: BTreeSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
    let unknown: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| !known.contains(n))
        .collect();
    if !unknown.is_empty() {
        return Err(BackupdError::Config(format!(
            "unknown job(s): {}",
            unknown.join(", ")
        )));
    }
    Ok(definitions
        .into_iter()
        .filter(|d| names.contains(&d.name))
        .collect())
}

fn print_summary(definitions: &[JobDefinition]) {
    println!("configuration OK, {} job(s):", definitions.len());
    for def in definitions {
        let primary = def
            .targets
            .primary()
            .map(|t| t.name.as_str())
            .unwrap_or("<none>");
        println!(
            "  {:<24} {:<16} {:<40} primary={} local={} cloud={}",
            def.name,
            def.body.kind(),
            def.period,
            primary,
            def.targets.local_devices.len(),
            def.targets.cloud_repos.len(),
        );
    }
}

fn print_history(config: &BackupdConfig, limit: usize) -> anyhow::Result<()> {
    let path = config
        .history
        .path
        .as_ref()
        .context("run history is disabled; set [history] path in the configuration")?;
    let history = RunHistory::open(path)?;
    for run in history.recent(limit)? {
        println!(
            "{}  {:<24} {:<9} errors={}  finished {}",
            run.started_at, run.job, run.status, run.error_count, run.finished_at
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use backupd_core::config::JobBody;
    use backupd_core::types::{PeriodSpec, TargetSet, TimeOfDay};

    use super::*;

    fn def(name: &str) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            repo: name.to_string(),
            root: PathBuf::from("/srv"),
            password_file: PathBuf::from("/pw"),
            period: PeriodSpec::daily(1, TimeOfDay::default()),
            targets: TargetSet::default(),
            body: JobBody::Check {
                read_data: false,
                subset: None,
            },
        }
    }

    #[test]
    fn no_names_selects_everything() {
        let selected = select_jobs(vec![def("a"), def("b")], &[]).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn named_jobs_are_kept_in_config_order() {
        let names = vec!["c".to_string(), "a".to_string()];
        let selected = select_jobs(vec![def("a"), def("b"), def("c")], &names).unwrap();
        let names: Vec<&str> = selected.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn unknown_job_is_a_config_error() {
        let err = select_jobs(vec![def("a")], &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, BackupdError::Config(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn cli_parses_job_list() {
        let cli = Cli::try_parse_from(["backupd", "--immediate", "-t", "photos", "docs"]).unwrap();
        assert!(cli.immediate);
        assert_eq!(cli.jobs, ["photos", "docs"]);
        assert_eq!(cli.config, PathBuf::from(backupd_core::config::DEFAULT_CONFIG_PATH));
    }
}
