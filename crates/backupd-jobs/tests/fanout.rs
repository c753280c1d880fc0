//! Fan-out behaviour of a job run against recording collaborators.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use backupd_core::config::{JobBody, JobDefinition};
use backupd_core::types::{
    LocalTarget, PeriodSpec, RemoteKind, RemoteTarget, RetentionPolicy, TargetSet, TimeOfDay,
};
use backupd_host::{ContainerLifecycle, DeviceResolver, HostError, MountTable};
use backupd_jobs::{Job, Services};
use backupd_notify::{NotificationSink, Priority};
use backupd_scheduler::{ExecutionQueue, RunStatus, ScheduledJob, Worker};
use backupd_transfer::{Repository, TransferBackend, TransferError};

type CallLog = Arc<Mutex<Vec<String>>>;

// ---------------------------------------------------------------------------
// Recording collaborators
// ---------------------------------------------------------------------------

struct FakeDevices {
    mounts: MountTable,
}

#[async_trait]
impl DeviceResolver for FakeDevices {
    async fn list_mounts(&self) -> backupd_host::Result<MountTable> {
        Ok(self.mounts.clone())
    }
}

#[derive(Default)]
struct FakeTransfer {
    calls: CallLog,
    initialized: Mutex<HashSet<String>>,
    /// `"<op> <location>"` pairs that report an operational failure.
    failing: HashSet<String>,
    /// Operation that fails as if the tool could not be started.
    broken_op: Option<&'static str>,
    /// Like `broken_op`, for a single `"<op> <location>"` pair.
    broken_call: Option<&'static str>,
    /// Operation that panics.
    panicking_op: Option<&'static str>,
}

impl FakeTransfer {
    fn call(&self, op: &'static str, repo: &Repository, detail: &str) -> backupd_transfer::Result<Vec<String>> {
        let entry = if detail.is_empty() {
            format!("{op} {repo}")
        } else {
            format!("{op} {repo} {detail}")
        };
        self.calls.lock().unwrap().push(entry);

        if self.panicking_op == Some(op) {
            panic!("{op} exploded");
        }
        let target_call = format!("{op} {repo}");
        if self.broken_op == Some(op) || self.broken_call == Some(target_call.as_str()) {
            return Err(TransferError::Tool(HostError::Spawn {
                program: "restic".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }));
        }
        if self.failing.contains(&target_call) {
            return Ok(vec![format!("{op} for {repo} failed.")]);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl TransferBackend for FakeTransfer {
    async fn init(&self, repo: &Repository) -> backupd_transfer::Result<Vec<String>> {
        let created = self
            .initialized
            .lock()
            .unwrap()
            .insert(repo.location().to_string());
        self.call("init", repo, if created { "created" } else { "" })
    }

    async fn unlock(&self, repo: &Repository) -> backupd_transfer::Result<Vec<String>> {
        self.call("unlock", repo, "")
    }

    async fn backup(
        &self,
        repo: &Repository,
        paths: &[PathBuf],
        _excludes: &[PathBuf],
    ) -> backupd_transfer::Result<Vec<String>> {
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        self.call("backup", repo, &paths.join(","))
    }

    async fn copy(&self, src: &Repository, dst: &Repository) -> backupd_transfer::Result<Vec<String>> {
        self.call("copy", dst, &format!("from {src}"))
    }

    async fn prune(
        &self,
        repo: &Repository,
        _retention: &RetentionPolicy,
    ) -> backupd_transfer::Result<Vec<String>> {
        self.call("prune", repo, "")
    }

    async fn verify(
        &self,
        repo: &Repository,
        deep: bool,
        subset: Option<&str>,
    ) -> backupd_transfer::Result<Vec<String>> {
        self.call("verify", repo, &format!("deep={deep} subset={}", subset.unwrap_or("-")))
    }
}

struct FakeContainers {
    calls: CallLog,
    fail_stop: bool,
}

#[async_trait]
impl ContainerLifecycle for FakeContainers {
    async fn stop(&self, path: &Path) -> backupd_host::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("stop {}", path.display()));
        if self.fail_stop {
            return Err(HostError::CommandFailed {
                program: "docker".to_string(),
                code: 1,
                stderr: "no such service".to_string(),
            });
        }
        Ok(())
    }

    async fn start(&self, path: &Path) -> backupd_host::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("start {}", path.display()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, String, Priority)>>,
}

impl RecordingSink {
    fn with_priority(&self, priority: Priority) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, p)| *p == priority)
            .map(|(t, b, _)| (t.clone(), b.clone()))
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, title: &str, body: &str, priority: Priority) {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), priority));
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Harness {
    calls: CallLog,
    sink: Arc<RecordingSink>,
    services: Services,
}

impl Harness {
    fn new(mounted: &[&str], transfer: FakeTransfer) -> Self {
        Self::with_containers(mounted, transfer, false)
    }

    fn with_containers(mounted: &[&str], mut transfer: FakeTransfer, fail_stop: bool) -> Self {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        transfer.calls = Arc::clone(&calls);

        let all = [("sda1", "/mnt/a"), ("sdb1", "/mnt/b"), ("sdc1", "/mnt/c")];
        let mounts: MountTable = all
            .iter()
            .filter(|(dev, _)| mounted.contains(dev))
            .map(|(dev, mount)| (dev.to_string(), vec![PathBuf::from(mount)]))
            .collect::<HashMap<_, _>>();

        let sink = Arc::new(RecordingSink::default());
        let services = Services {
            devices: Arc::new(FakeDevices { mounts }),
            transfer: Arc::new(transfer),
            containers: Arc::new(FakeContainers {
                calls: Arc::clone(&calls),
                fail_stop,
            }),
            notifier: Arc::clone(&sink) as Arc<dyn NotificationSink>,
        };
        Self {
            calls,
            sink,
            services,
        }
    }

    fn job(&self, body: JobBody, targets: TargetSet, cloud_enabled: bool) -> Job {
        let def = JobDefinition {
            name: "photos".to_string(),
            repo: "photos".to_string(),
            root: PathBuf::from("/srv"),
            password_file: PathBuf::from("/etc/backupd/pw"),
            period: PeriodSpec::daily(1, TimeOfDay::default()),
            targets,
            body,
        };
        Job::new(def, self.services.clone(), cloud_enabled)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn high(&self) -> Vec<(String, String)> {
        self.sink.with_priority(Priority::High)
    }

    fn low(&self) -> Vec<(String, String)> {
        self.sink.with_priority(Priority::Low)
    }
}

fn local(name: &str, device_id: &str, primary: bool) -> LocalTarget {
    LocalTarget {
        name: name.to_string(),
        device_id: device_id.to_string(),
        primary,
    }
}

fn remote() -> RemoteTarget {
    RemoteTarget {
        kind: RemoteKind::S3Compatible,
        path: "s3.example.com/bucket".to_string(),
        key_id: "id".to_string(),
        key: "secret".to_string(),
    }
}

fn targets(secondaries: usize, with_remote: bool) -> TargetSet {
    let mut local_devices = vec![local("disk-a", "sda1", true)];
    if secondaries >= 1 {
        local_devices.push(local("disk-b", "sdb1", false));
    }
    if secondaries >= 2 {
        local_devices.push(local("disk-c", "sdc1", false));
    }
    TargetSet {
        local_devices,
        cloud_repos: if with_remote { vec![remote()] } else { Vec::new() },
    }
}

fn data_backup() -> JobBody {
    JobBody::DataBackup {
        paths: vec!["photos".to_string(), "music".to_string()],
        excludes: Vec::new(),
        retention: RetentionPolicy::default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_success_sends_one_low_notification() {
    let h = Harness::new(&["sda1", "sdb1"], FakeTransfer::default());
    let job = h.job(data_backup(), targets(1, false), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(
        h.calls(),
        [
            "init /mnt/a/photos created",
            "unlock /mnt/a/photos",
            "backup /mnt/a/photos /srv/photos,/srv/music",
            "prune /mnt/a/photos",
            "init /mnt/b/photos created",
            "unlock /mnt/b/photos",
            "copy /mnt/b/photos from /mnt/a/photos",
            "prune /mnt/b/photos",
        ]
    );
    assert_eq!(h.low().len(), 1);
    assert_eq!(h.low()[0].0, "Backup Complete");
    assert!(h.high().is_empty());
}

#[tokio::test]
async fn unmounted_primary_aborts_without_touching_other_targets() {
    let h = Harness::new(&["sdb1", "sdc1"], FakeTransfer::default());
    let job = h.job(data_backup(), targets(2, true), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Aborted);
    assert!(h.calls().is_empty(), "unexpected calls: {:?}", h.calls());
    let high = h.high();
    assert_eq!(high.len(), 1);
    assert!(high[0].1.contains("sda1"));
    assert!(h.low().is_empty());
}

#[tokio::test]
async fn missing_primary_is_reported_once() {
    let h = Harness::new(&["sda1", "sdb1"], FakeTransfer::default());
    let mut no_primary = targets(1, false);
    no_primary.local_devices[0].primary = false;
    let job = h.job(data_backup(), no_primary, true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Aborted);
    assert!(h.calls().is_empty());
    assert_eq!(h.high(), [(
        "Backup Failed".to_string(),
        "No primary device found for photos".to_string()
    )]);
}

#[tokio::test]
async fn unmounted_secondary_is_isolated_and_reported() {
    let h = Harness::new(&["sda1", "sdb1"], FakeTransfer::default());
    let job = h.job(data_backup(), targets(2, true), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.error_count, 1);

    let calls = h.calls();
    assert!(calls.iter().all(|c| !c.contains("/mnt/c")));
    for repo in ["/mnt/b/photos", "s3:s3.example.com/bucket/photos"] {
        for op in ["init", "unlock", "copy", "prune"] {
            assert!(
                calls.iter().any(|c| c.starts_with(&format!("{op} {repo}"))),
                "missing {op} on {repo}: {calls:?}"
            );
        }
    }

    let high = h.high();
    assert_eq!(high.len(), 1);
    assert!(high[0].0.contains("disk-c"));
    assert!(high[0].1.contains("sdc1"));
    assert!(!high[0].1.contains("sdb1"));
    assert!(h.low().is_empty());
}

#[tokio::test]
async fn failing_secondary_does_not_stop_the_rest() {
    let transfer = FakeTransfer {
        failing: HashSet::from(["copy /mnt/b/photos".to_string()]),
        ..Default::default()
    };
    let h = Harness::new(&["sda1", "sdb1", "sdc1"], transfer);
    let job = h.job(data_backup(), targets(2, true), true);

    let summary = job.run().await;

    assert_eq!(summary.error_count, 1);
    let calls = h.calls();
    assert!(calls.contains(&"prune /mnt/b/photos".to_string()));
    assert!(calls.contains(&"copy /mnt/c/photos from /mnt/a/photos".to_string()));
    assert!(calls.contains(&"prune s3:s3.example.com/bucket/photos".to_string()));

    let high = h.high();
    assert_eq!(high.len(), 1);
    assert_eq!(
        high[0].0,
        "[An Error] while running backup task photos - /mnt/b/photos"
    );
    assert!(h.low().is_empty());
}

#[tokio::test]
async fn primary_errors_are_reported_in_one_notification() {
    let transfer = FakeTransfer {
        failing: HashSet::from([
            "backup /mnt/a/photos".to_string(),
            "prune /mnt/a/photos".to_string(),
        ]),
        ..Default::default()
    };
    let h = Harness::new(&["sda1"], transfer);
    let job = h.job(data_backup(), targets(0, false), true);

    let summary = job.run().await;

    assert_eq!(summary.error_count, 2);
    let high = h.high();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].0, "[Errors] while running backup task photos - /mnt/a/photos");
    assert_eq!(high[0].1.lines().count(), 2);
}

#[tokio::test]
async fn init_is_idempotent_across_runs() {
    let h = Harness::new(&["sda1"], FakeTransfer::default());
    let repo = Repository::local(Path::new("/mnt/a"), "photos", Path::new("/pw"));

    assert!(h.services.transfer.init(&repo).await.unwrap().is_empty());
    assert!(h.services.transfer.init(&repo).await.unwrap().is_empty());

    let job = h.job(data_backup(), targets(0, false), true);
    assert_eq!(job.run().await.status, RunStatus::Succeeded);
    assert_eq!(job.run().await.status, RunStatus::Succeeded);
    assert_eq!(h.low().len(), 2);
    assert!(h.calls().contains(&"init /mnt/a/photos created".to_string()));
    assert_eq!(
        h.calls().iter().filter(|c| c.ends_with("created")).count(),
        1
    );
}

#[tokio::test]
async fn no_cloud_skips_remote_targets() {
    let h = Harness::new(&["sda1", "sdb1"], FakeTransfer::default());
    let job = h.job(data_backup(), targets(1, true), false);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert!(h.calls().iter().all(|c| !c.contains("s3:")));
    assert_eq!(h.low().len(), 1);
}

#[tokio::test]
async fn containers_are_restarted_around_each_backup() {
    let transfer = FakeTransfer {
        failing: HashSet::from(["backup /mnt/a/photos".to_string()]),
        ..Default::default()
    };
    let h = Harness::with_containers(&["sda1"], transfer, true);
    let body = JobBody::ContainerBackup {
        paths: vec!["immich".to_string(), "paperless".to_string()],
        retention: RetentionPolicy::default(),
    };
    let job = h.job(body, targets(0, false), true);

    let summary = job.run().await;

    // Stop failures are logged only; each backup failure counts.
    assert_eq!(summary.error_count, 2);
    let sequence: Vec<String> = h
        .calls()
        .into_iter()
        .filter(|c| !c.starts_with("init") && !c.starts_with("unlock") && !c.starts_with("prune"))
        .collect();
    assert_eq!(
        sequence,
        [
            "stop /srv/immich",
            "backup /mnt/a/photos /srv/immich",
            "start /srv/immich",
            "stop /srv/paperless",
            "backup /mnt/a/photos /srv/paperless",
            "start /srv/paperless",
        ]
    );
}

#[tokio::test]
async fn container_is_restarted_when_backup_tool_is_missing() {
    let transfer = FakeTransfer {
        broken_op: Some("backup"),
        ..Default::default()
    };
    let h = Harness::with_containers(&["sda1"], transfer, false);
    let body = JobBody::ContainerBackup {
        paths: vec!["immich".to_string()],
        retention: RetentionPolicy::default(),
    };
    let job = h.job(body, targets(0, false), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(h.calls().contains(&"start /srv/immich".to_string()));
    assert_eq!(h.high(), [(
        "Backup Failed".to_string(),
        "Error occurred during backup for photos".to_string()
    )]);
}

#[tokio::test]
async fn check_job_verifies_every_target_independently() {
    let transfer = FakeTransfer {
        failing: HashSet::from(["verify /mnt/a/photos".to_string()]),
        ..Default::default()
    };
    let h = Harness::new(&["sda1", "sdb1"], transfer);
    let body = JobBody::Check {
        read_data: true,
        subset: Some("10%".to_string()),
    };
    let job = h.job(body, targets(2, true), true);

    let summary = job.run().await;

    assert_eq!(
        h.calls(),
        [
            "verify /mnt/a/photos deep=true subset=10%",
            "verify /mnt/b/photos deep=true subset=10%",
            "verify s3:s3.example.com/bucket/photos deep=true subset=10%",
        ]
    );
    // One for the failed verify, one for the unmounted disk-c.
    assert_eq!(summary.error_count, 2);
    assert_eq!(h.high().len(), 2);
    assert!(h.low().is_empty());
}

#[tokio::test]
async fn unexpected_primary_errors_are_caught_at_the_job_boundary() {
    let transfer = FakeTransfer {
        broken_call: Some("backup /mnt/a/photos"),
        ..Default::default()
    };
    let h = Harness::new(&["sda1", "sdb1"], transfer);
    let job = h.job(data_backup(), targets(1, false), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(h.calls().iter().all(|c| !c.contains("/mnt/b")));
    let high = h.high();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].1, "Error occurred during backup for photos");
    assert!(h.low().is_empty());
}

#[tokio::test]
async fn unexpected_secondary_error_stays_with_that_target() {
    let transfer = FakeTransfer {
        broken_call: Some("copy /mnt/b/photos"),
        ..Default::default()
    };
    let h = Harness::new(&["sda1", "sdb1", "sdc1"], transfer);
    let job = h.job(data_backup(), targets(2, true), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.error_count, 1);

    let calls = h.calls();
    assert!(!calls.contains(&"prune /mnt/b/photos".to_string()));
    for repo in ["/mnt/c/photos", "s3:s3.example.com/bucket/photos"] {
        for op in ["init", "unlock", "copy", "prune"] {
            assert!(
                calls.iter().any(|c| c.starts_with(&format!("{op} {repo}"))),
                "missing {op} on {repo}: {calls:?}"
            );
        }
    }

    let high = h.high();
    assert_eq!(high.len(), 1);
    assert_eq!(
        high[0].0,
        "[An Error] while running backup task photos - /mnt/b/photos"
    );
    assert!(high[0].1.starts_with("Backup to /mnt/b/photos stopped:"));
    assert!(h.low().is_empty());
}

#[tokio::test]
async fn unexpected_check_error_stays_with_that_target() {
    let transfer = FakeTransfer {
        broken_call: Some("verify /mnt/a/photos"),
        ..Default::default()
    };
    let h = Harness::new(&["sda1", "sdb1"], transfer);
    let body = JobBody::Check {
        read_data: false,
        subset: None,
    };
    let job = h.job(body, targets(1, true), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.error_count, 1);
    assert_eq!(h.calls().len(), 3);
    assert!(h
        .calls()
        .contains(&"verify s3:s3.example.com/bucket/photos deep=false subset=-".to_string()));
    let high = h.high();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].0, "[An Error] while running check task photos - /mnt/a/photos");
}

#[tokio::test]
async fn panics_are_caught_at_the_job_boundary() {
    let transfer = FakeTransfer {
        panicking_op: Some("prune"),
        ..Default::default()
    };
    let h = Harness::new(&["sda1"], transfer);
    let job = h.job(data_backup(), targets(0, false), true);

    let summary = job.run().await;

    assert_eq!(summary.status, RunStatus::Crashed);
    assert_eq!(h.high().len(), 1);
    assert_eq!(h.high()[0].0, "Backup Failed");
}

#[tokio::test]
async fn worker_clears_queued_flag_after_run() {
    let h = Harness::new(&["sda1"], FakeTransfer::default());
    let job = Arc::new(h.job(data_backup(), targets(0, false), true));

    let (queue, rx) = ExecutionQueue::new();
    assert!(queue.enqueue(job.clone()));
    assert!(!queue.enqueue(job.clone()));
    assert!(job.queue_flag().is_set());

    let worker = Worker::new(rx, None);
    drop(queue);
    let (_tx, shutdown) = tokio::sync::watch::channel(false);
    worker.run(shutdown).await;

    assert!(!job.queue_flag().is_set());
    assert_eq!(h.low().len(), 1);
}
