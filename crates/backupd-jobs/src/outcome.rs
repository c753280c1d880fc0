use backupd_scheduler::{RunStatus, RunSummary};

/// Errors collected against one repository during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    pub errors: Vec<String>,
}

/// Per-target results of one run. Empty error lists mean success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub reports: Vec<TargetReport>,
}

impl RunOutcome {
    pub fn record(&mut self, target: impl Into<String>, errors: Vec<String>) {
        self.reports.push(TargetReport {
            target: target.into(),
            errors,
        });
    }

    pub fn error_count(&self) -> usize {
        self.reports.iter().map(|r| r.errors.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.error_count() == 0
    }

    pub fn summary(&self) -> RunSummary {
        let error_count = u32::try_from(self.error_count()).unwrap_or(u32::MAX);
        RunSummary {
            status: if error_count == 0 {
                RunStatus::Succeeded
            } else {
                RunStatus::Failed
            },
            error_count,
        }
    }
}
