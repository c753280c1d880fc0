use chrono::NaiveDateTime;

/// Number of due-eligible triggers that elapsed since the job last ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipState {
    pub skip_count: u32,
}

/// Next wall-clock instant at which the job's natural cadence fires.
///
/// `None` until the first tick, so a freshly started process never fires for
/// triggers that elapsed before it was running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerState {
    pub next: Option<NaiveDateTime>,
}

/// Final classification of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every target completed without errors.
    Succeeded,
    /// Some target reported errors, or an unexpected error ended the run.
    Failed,
    /// The primary target was unavailable; nothing was touched.
    Aborted,
    /// The run panicked.
    Crashed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
            RunStatus::Crashed => "crashed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "aborted" => Ok(RunStatus::Aborted),
            "crashed" => Ok(RunStatus::Crashed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// What a job reports back to the worker when its run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RunStatus,
    /// Total error strings across all targets.
    pub error_count: u32,
}

impl RunSummary {
    pub fn crashed() -> Self {
        Self {
            status: RunStatus::Crashed,
            error_count: 1,
        }
    }
}

/// A persisted run row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    /// UUID v4 string, primary key.
    pub id: String,
    pub job: String,
    /// ISO-8601 timestamp of the run start.
    pub started_at: String,
    /// ISO-8601 timestamp of the run end.
    pub finished_at: String,
    pub status: RunStatus,
    pub error_count: u32,
}
