use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::RunHistory,
    schedule::PeriodPolicy,
    types::{RunRecord, RunSummary},
};

/// A job the scheduler can time, queue and run.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Unique, human-readable job name.
    fn name(&self) -> &str;

    fn policy(&self) -> &PeriodPolicy;

    /// Set from successful enqueue until the run completes.
    fn queue_flag(&self) -> &QueueFlag;

    /// Execute one run to completion. Implementations report their own
    /// failures and must not rely on the caller for error handling.
    async fn run(&self) -> RunSummary;
}

pub type JobRef = Arc<dyn ScheduledJob>;

/// The per-job `queued` bit.
#[derive(Debug, Default)]
pub struct QueueFlag(AtomicBool);

impl QueueFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Atomically flip idle → queued. Returns false if already queued.
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Producer side of the single FIFO execution queue.
///
/// Cheap to clone; every clone feeds the same worker.
#[derive(Clone)]
pub struct ExecutionQueue {
    tx: mpsc::UnboundedSender<JobRef>,
    depth: Arc<AtomicUsize>,
}

/// Consumer side, owned by exactly one [`Worker`].
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<JobRef>,
    depth: Arc<AtomicUsize>,
}

impl ExecutionQueue {
    pub fn new() -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                depth: Arc::clone(&depth),
            },
            QueueReceiver { rx, depth },
        )
    }

    /// Append `job` unless it is already queued or running.
    ///
    /// Returns true when the job was added. Safe to call from any task while
    /// the worker is draining.
    pub fn enqueue(&self, job: JobRef) -> bool {
        if !job.queue_flag().try_claim() {
            warn!(job = %job.name(), "job is already queued or running, not queuing again");
            return false;
        }

        self.depth.fetch_add(1, Ordering::AcqRel);
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            job.queue_flag().release();
            error!(job = %job.name(), "execution queue closed, job dropped");
            return false;
        }
        true
    }

    /// Jobs waiting to be picked up by the worker.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueReceiver {
    pub async fn recv(&mut self) -> Option<JobRef> {
        let job = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Some(job)
    }

    pub fn try_recv(&mut self) -> Option<JobRef> {
        let job = self.rx.try_recv().ok()?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Some(job)
    }
}

/// Drains the execution queue, running one job at a time.
pub struct Worker {
    rx: QueueReceiver,
    history: Option<Arc<RunHistory>>,
}

impl Worker {
    pub fn new(rx: QueueReceiver, history: Option<RunHistory>) -> Self {
        Self {
            rx,
            history: history.map(Arc::new),
        }
    }

    /// Main worker loop. Runs until `shutdown` broadcasts `true` or every
    /// queue producer is dropped. A job that is already running finishes
    /// before shutdown is observed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("execution worker started");
        loop {
            let job = tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            self.execute(job).await;
        }
        info!("execution worker stopped");
    }

    /// Run one job, always clearing its queued flag afterwards.
    pub async fn execute(&self, job: JobRef) -> RunSummary {
        let name = job.name().to_string();
        let started_at = Utc::now();
        info!(job = %name, "running job");

        // Run on its own task so a panic surfaces as a JoinError here
        // instead of unwinding through the loop.
        let runner = Arc::clone(&job);
        let summary = match tokio::spawn(async move { runner.run().await }).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(job = %name, error = %e, "job run did not complete; worker continues");
                RunSummary::crashed()
            }
        };
        job.queue_flag().release();

        let finished_at = Utc::now();
        info!(
            job = %name,
            status = %summary.status,
            errors = summary.error_count,
            elapsed_secs = (finished_at - started_at).num_seconds(),
            "job finished"
        );

        if let Some(ref history) = self.history {
            let history = Arc::clone(history);
            let record = RunRecord {
                id: Uuid::new_v4().to_string(),
                job: name.clone(),
                started_at: started_at.to_rfc3339(),
                finished_at: finished_at.to_rfc3339(),
                status: summary.status,
                error_count: summary.error_count,
            };
            // rusqlite blocks; keep the insert off the runtime threads.
            match tokio::task::spawn_blocking(move || history.record(&record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(job = %name, error = %e, "failed to record run history"),
                Err(e) => warn!(job = %name, error = %e, "run history task failed"),
            }
        }
        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use backupd_core::types::{PeriodSpec, TimeOfDay};

    use super::*;
    use crate::types::RunStatus;

    pub(crate) struct FakeJob {
        name: String,
        policy: PeriodPolicy,
        flag: QueueFlag,
        panics: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeJob {
        pub(crate) fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                policy: PeriodPolicy::new(PeriodSpec::daily(1, TimeOfDay::default())),
                flag: QueueFlag::new(),
                panics: false,
                log: Arc::clone(log),
            })
        }

        fn panicking(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                policy: PeriodPolicy::new(PeriodSpec::daily(1, TimeOfDay::default())),
                flag: QueueFlag::new(),
                panics: true,
                log: Arc::clone(log),
            })
        }
    }

    #[async_trait]
    impl ScheduledJob for FakeJob {
        fn name(&self) -> &str {
            &self.name
        }
        fn policy(&self) -> &PeriodPolicy {
            &self.policy
        }
        fn queue_flag(&self) -> &QueueFlag {
            &self.flag
        }
        async fn run(&self) -> RunSummary {
            assert!(self.flag.is_set(), "flag must stay set while running");
            if self.panics {
                panic!("boom");
            }
            self.log.lock().unwrap().push(self.name.clone());
            RunSummary {
                status: RunStatus::Succeeded,
                error_count: 0,
            }
        }
    }

    #[test]
    fn enqueue_twice_queues_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (queue, mut rx) = ExecutionQueue::new();
        let job = FakeJob::new("photos", &log);

        assert!(queue.enqueue(job.clone()));
        assert!(!queue.enqueue(job.clone()));
        assert_eq!(queue.len(), 1);
        assert!(job.flag.is_set());

        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_on_closed_queue_releases_flag() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (queue, rx) = ExecutionQueue::new();
        drop(rx);
        let job = FakeJob::new("photos", &log);
        assert!(!queue.enqueue(job.clone()));
        assert!(!job.flag.is_set());
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn worker_runs_fifo_and_clears_flags() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (queue, rx) = ExecutionQueue::new();
        let a = FakeJob::new("a", &log);
        let b = FakeJob::new("b", &log);
        assert!(queue.enqueue(a.clone()));
        assert!(queue.enqueue(b.clone()));
        drop(queue);

        let (_tx, shutdown) = watch::channel(false);
        Worker::new(rx, None).run(shutdown).await;

        assert_eq!(*log.lock().unwrap(), ["a", "b"]);
        assert!(!a.flag.is_set());
        assert!(!b.flag.is_set());
    }

    #[tokio::test]
    async fn worker_survives_panicking_job() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (queue, rx) = ExecutionQueue::new();
        let bad = FakeJob::panicking("bad", &log);
        let good = FakeJob::new("good", &log);
        assert!(queue.enqueue(bad.clone()));
        assert!(queue.enqueue(good.clone()));
        drop(queue);

        let (_tx, shutdown) = watch::channel(false);
        Worker::new(rx, None).run(shutdown).await;

        assert_eq!(*log.lock().unwrap(), ["good"]);
        assert!(!bad.flag.is_set());
        // A crashed job can be queued again.
        let (queue, _rx) = ExecutionQueue::new();
        assert!(queue.enqueue(bad));
    }

    #[tokio::test]
    async fn worker_records_history() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_queue, rx) = ExecutionQueue::new();
        let history = RunHistory::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let worker = Worker::new(rx, Some(history));

        let job = FakeJob::new("photos", &log);
        assert!(job.flag.try_claim());
        let summary = worker.execute(job.clone()).await;
        assert_eq!(summary.status, RunStatus::Succeeded);
        assert!(!job.flag.is_set());

        let runs = worker.history.as_ref().unwrap().recent(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].job, "photos");
        assert_eq!(runs[0].status, RunStatus::Succeeded);

        // Each insert completes before `execute` returns.
        worker.execute(job.clone()).await;
        let runs = worker.history.as_ref().unwrap().recent(5).unwrap();
        assert_eq!(runs.len(), 2);
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let (_queue, rx) = ExecutionQueue::new();
        let (tx, shutdown) = watch::channel(false);
        let handle = tokio::spawn(Worker::new(rx, None).run(shutdown));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
