use std::sync::Mutex;

use backupd_core::types::{PeriodKind, PeriodSpec};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::types::{SkipState, TriggerState};

/// How the natural cadence of one [`PeriodKind`] advances.
struct TriggerRule {
    kind: PeriodKind,
    /// First trigger strictly after `now`.
    first: fn(&PeriodSpec, NaiveDateTime) -> NaiveDateTime,
    /// Distance between consecutive triggers.
    step_hours: i64,
}

static TRIGGER_RULES: [TriggerRule; 4] = [
    TriggerRule {
        kind: PeriodKind::Hourly,
        first: first_hourly,
        step_hours: 1,
    },
    TriggerRule {
        kind: PeriodKind::Daily,
        first: first_daily,
        step_hours: 24,
    },
    TriggerRule {
        kind: PeriodKind::Weekly,
        first: first_weekly,
        step_hours: 24 * 7,
    },
    // Monthly jobs are triggered daily; `is_due` filters on the day of month.
    TriggerRule {
        kind: PeriodKind::Monthly,
        first: first_daily,
        step_hours: 24,
    },
];

fn rule_for(kind: PeriodKind) -> &'static TriggerRule {
    TRIGGER_RULES
        .iter()
        .find(|r| r.kind == kind)
        .expect("every period kind has a trigger rule")
}

fn first_hourly(spec: &PeriodSpec, now: NaiveDateTime) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(now.hour(), spec.time_of_day.minute(), 0).unwrap_or_default();
    let candidate = now.date().and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::hours(1)
    }
}

fn first_daily(spec: &PeriodSpec, now: NaiveDateTime) -> NaiveDateTime {
    let candidate = now.date().and_time(spec.time_of_day.as_naive());
    if candidate > now {
        candidate
    } else {
        // Today's window has passed; advance to tomorrow.
        candidate + Duration::days(1)
    }
}

fn first_weekly(spec: &PeriodSpec, now: NaiveDateTime) -> NaiveDateTime {
    let mut candidate = first_daily(spec, now);
    if let Some(day) = spec.weekday {
        let target = chrono::Weekday::from(day);
        while candidate.weekday() != target {
            candidate += Duration::days(1);
        }
    }
    candidate
}

impl TriggerState {
    /// Report whether a trigger of `spec`'s cadence has arrived at `now`.
    ///
    /// Returns true at most once per trigger. Triggers missed while the
    /// process was suspended collapse into a single firing.
    pub fn poll(&mut self, spec: &PeriodSpec, now: NaiveDateTime) -> bool {
        let rule = rule_for(spec.kind);
        let next = *self.next.get_or_insert_with(|| (rule.first)(spec, now));
        if now < next {
            return false;
        }

        let step = Duration::hours(rule.step_hours);
        let mut upcoming = next + step;
        while upcoming <= now {
            upcoming += step;
        }
        self.next = Some(upcoming);
        true
    }
}

/// Decide whether a trigger at `now` is due, updating the skip counter.
///
/// Call only when the job's cadence fires (see [`TriggerState::poll`]).
pub fn is_due(spec: &PeriodSpec, skip: &mut SkipState, now: NaiveDateTime) -> bool {
    match spec.kind {
        // Pinned weekly triggers only fire on the pinned weekday; each is due.
        PeriodKind::Weekly if spec.weekday.is_some() => {
            skip.skip_count = 0;
            true
        }
        PeriodKind::Monthly => {
            if Some(now.day()) != spec.day_of_month {
                return false;
            }
            frequency_gate(spec.frequency, skip)
        }
        PeriodKind::Hourly | PeriodKind::Daily | PeriodKind::Weekly => {
            frequency_gate(spec.frequency, skip)
        }
    }
}

fn frequency_gate(frequency: u32, skip: &mut SkipState) -> bool {
    if skip.skip_count + 1 >= frequency {
        skip.skip_count = 0;
        true
    } else {
        skip.skip_count += 1;
        false
    }
}

#[derive(Debug, Default)]
struct PolicyState {
    skip: SkipState,
    trigger: TriggerState,
}

/// A job's period spec together with its mutable scheduling state.
#[derive(Debug)]
pub struct PeriodPolicy {
    spec: PeriodSpec,
    state: Mutex<PolicyState>,
}

impl PeriodPolicy {
    pub fn new(spec: PeriodSpec) -> Self {
        Self {
            spec,
            state: Mutex::new(PolicyState::default()),
        }
    }

    pub fn spec(&self) -> &PeriodSpec {
        &self.spec
    }

    /// Evaluate one driver tick. Never blocks beyond the state lock.
    pub fn tick(&self, now: NaiveDateTime) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let PolicyState { skip, trigger } = &mut *state;
        trigger.poll(&self.spec, now) && is_due(&self.spec, skip, now)
    }

    pub fn skip_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .skip
            .skip_count
    }

    pub fn next_trigger(&self) -> Option<NaiveDateTime> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .trigger
            .next
    }
}
