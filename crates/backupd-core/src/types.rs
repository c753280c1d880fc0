use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// Natural cadence of a periodic job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeriodKind::Hourly => "hourly",
            PeriodKind::Daily => "daily",
            PeriodKind::Weekly => "weekly",
            PeriodKind::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

/// Day of the week a weekly job is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl From<Weekday> for chrono::Weekday {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Sunday => chrono::Weekday::Sun,
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
        }
    }
}

/// Wall-clock time of day, written as `"HH:MM"` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }
}

impl Default for TimeOfDay {
    fn default() -> Self {
        Self(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| format!("invalid time of day '{s}' (expected HH:MM)"))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// When and how often a job becomes due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSpec {
    #[serde(alias = "type")]
    pub kind: PeriodKind,
    /// Run on every `frequency`-th trigger of the natural cadence.
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    #[serde(default, rename = "run_time", alias = "time_of_day")]
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub weekday: Option<Weekday>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
}

fn default_frequency() -> u32 {
    1
}

impl PeriodSpec {
    pub fn daily(frequency: u32, time_of_day: TimeOfDay) -> Self {
        Self {
            kind: PeriodKind::Daily,
            frequency,
            time_of_day,
            weekday: None,
            day_of_month: None,
        }
    }

    /// Check the cross-field rules the serde shape cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.frequency == 0 {
            return Err("period frequency must be at least 1".to_string());
        }
        if self.weekday.is_some() && self.kind != PeriodKind::Weekly {
            return Err(format!("weekday is only valid for weekly periods, not {}", self.kind));
        }
        match (self.kind, self.day_of_month) {
            (PeriodKind::Monthly, None) => {
                Err("monthly periods require day_of_month".to_string())
            }
            (PeriodKind::Monthly, Some(d)) if !(1..=31).contains(&d) => {
                Err(format!("day_of_month must be within 1..=31, got {d}"))
            }
            (PeriodKind::Monthly, Some(_)) => Ok(()),
            (kind, Some(_)) => Err(format!(
                "day_of_month is only valid for monthly periods, not {kind}"
            )),
            (_, None) => Ok(()),
        }
    }
}

impl fmt::Display for PeriodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{} at {}", self.kind, self.frequency, self.time_of_day)?;
        if let Some(day) = self.weekday {
            write!(f, " on {day:?}")?;
        }
        if let Some(day) = self.day_of_month {
            write!(f, " on day {day}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Snapshot retention applied after every backup or copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_keep_daily", alias = "days")]
    pub keep_daily: u32,
    #[serde(default = "default_keep_weekly", alias = "weeks")]
    pub keep_weekly: u32,
    #[serde(default = "default_keep_monthly", alias = "months")]
    pub keep_monthly: u32,
    #[serde(default = "default_keep_yearly", alias = "years")]
    pub keep_yearly: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_daily: default_keep_daily(),
            keep_weekly: default_keep_weekly(),
            keep_monthly: default_keep_monthly(),
            keep_yearly: default_keep_yearly(),
        }
    }
}

fn default_keep_daily() -> u32 {
    14
}
fn default_keep_weekly() -> u32 {
    16
}
fn default_keep_monthly() -> u32 {
    18
}
fn default_keep_yearly() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A locally attached block device holding one of the job's repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTarget {
    pub name: String,
    /// Block device name or filesystem label as reported by lsblk.
    pub device_id: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteKind {
    #[serde(rename = "s3-compatible", alias = "s3")]
    S3Compatible,
}

/// An off-site repository reached over the network.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    #[serde(alias = "type")]
    pub kind: RemoteKind,
    pub path: String,
    pub key_id: String,
    pub key: String,
}

impl RemoteTarget {
    /// Repository root as understood by restic, always ending in `/`.
    pub fn endpoint_root(&self) -> String {
        let prefix = match self.kind {
            RemoteKind::S3Compatible => "s3:",
        };
        let mut root = format!("{prefix}{}", self.path);
        if !root.ends_with('/') {
            root.push('/');
        }
        root
    }

    /// Environment the backup tool needs to authenticate against this target.
    pub fn credentials(&self) -> Vec<(String, String)> {
        match self.kind {
            RemoteKind::S3Compatible => vec![
                ("AWS_ACCESS_KEY_ID".to_string(), self.key_id.clone()),
                ("AWS_SECRET_ACCESS_KEY".to_string(), self.key.clone()),
            ],
        }
    }
}

// Keys never reach the logs.
impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Every destination a job writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TargetSet {
    #[serde(default)]
    pub local_devices: Vec<LocalTarget>,
    #[serde(default)]
    pub cloud_repos: Vec<RemoteTarget>,
}

impl TargetSet {
    pub fn primary(&self) -> Option<&LocalTarget> {
        self.local_devices.iter().find(|t| t.primary)
    }

    /// Non-primary local targets, in configured order.
    pub fn secondaries(&self) -> impl Iterator<Item = &LocalTarget> {
        self.local_devices.iter().filter(|t| !t.primary)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.local_devices.is_empty() {
            return Err("at least one local device is required".to_string());
        }
        let primaries = self.local_devices.iter().filter(|t| t.primary).count();
        if primaries > 1 {
            return Err(format!("{primaries} local devices are marked primary; at most one is allowed"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKindTag {
    #[serde(rename = "data-backup")]
    DataBackup,
    #[serde(rename = "container-backup", alias = "docker-compose-backup")]
    ContainerBackup,
    #[serde(rename = "check")]
    Check,
}

impl fmt::Display for JobKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKindTag::DataBackup => "data-backup",
            JobKindTag::ContainerBackup => "container-backup",
            JobKindTag::Check => "check",
        };
        write!(f, "{s}")
    }
}
