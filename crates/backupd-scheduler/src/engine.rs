use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::queue::{ExecutionQueue, JobRef};

/// Default driver cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Tick driver: asks every job's period policy whether it is due and
/// enqueues the ones that are. Never waits on job execution.
pub struct SchedulerEngine {
    jobs: Vec<JobRef>,
    queue: ExecutionQueue,
    tick_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(jobs: Vec<JobRef>, queue: ExecutionQueue) -> Self {
        Self {
            jobs,
            queue,
            tick_interval: TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Main event loop. Ticks every second until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        for job in &self.jobs {
            info!(job = %job.name(), period = %job.policy().spec(), "scheduling job");
        }
        info!(jobs = self.jobs.len(), "scheduler engine started");

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Local::now().naive_local());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Evaluate every job once at `now`. Returns how many jobs were enqueued.
    pub fn tick(&self, now: NaiveDateTime) -> usize {
        let mut enqueued = 0;
        for job in &self.jobs {
            if !job.policy().tick(now) {
                continue;
            }
            info!(job = %job.name(), "job is due");
            if self.queue.enqueue(Arc::clone(job)) {
                enqueued += 1;
                debug!(
                    job = %job.name(),
                    next_trigger = ?job.policy().next_trigger(),
                    queue_depth = self.queue.len(),
                    "job queued"
                );
            }
        }
        enqueued
    }
}
