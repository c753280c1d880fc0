//! `backupd-scheduler`: period policy, execution queue and tick driver.
//!
//! # Overview
//!
//! The [`engine::SchedulerEngine`] ticks once per second. On every tick each
//! job's [`schedule::PeriodPolicy`] decides whether a trigger has arrived and
//! whether that trigger is due once the job's frequency is taken into
//! account. Due jobs are pushed onto the [`queue::ExecutionQueue`], which a
//! single [`queue::Worker`] drains strictly one job at a time.
//!
//! # Trigger rules
//!
//! | Kind      | First trigger                          | Step    | Due when                          |
//! |-----------|----------------------------------------|---------|-----------------------------------|
//! | `Hourly`  | next `:MM` of the configured minute    | 1 hour  | every `frequency`-th trigger      |
//! | `Daily`   | next `HH:MM`                           | 1 day   | every `frequency`-th trigger      |
//! | `Weekly`  | next `HH:MM` on the pinned weekday     | 7 days  | always when pinned, else frequency |
//! | `Monthly` | next `HH:MM`                           | 1 day   | on `day_of_month`, every `frequency`-th match |

pub mod db;
pub mod engine;
pub mod error;
pub mod queue;
pub mod schedule;
pub mod types;

pub use db::RunHistory;
pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use queue::{ExecutionQueue, JobRef, QueueFlag, QueueReceiver, ScheduledJob, Worker};
pub use schedule::{is_due, PeriodPolicy};
pub use types::{RunRecord, RunStatus, RunSummary, SkipState, TriggerState};
