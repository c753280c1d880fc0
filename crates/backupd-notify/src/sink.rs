use std::fmt;

use async_trait::async_trait;
use tracing::{info, warn};

/// Urgency attached to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Min,
    Low,
    Default,
    High,
    Max,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Min => "min",
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
            Priority::Max => "max",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers operator notifications.
///
/// Fire-and-forget: implementations log delivery failures and never report
/// them to the caller.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, title: &str, body: &str, priority: Priority);
}

/// Sink that only writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, title: &str, body: &str, priority: Priority) {
        if priority >= Priority::High {
            warn!(%priority, title, body, "notification");
        } else {
            info!(%priority, title, body, "notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_wire_names() {
        let all = [
            Priority::Min,
            Priority::Low,
            Priority::Default,
            Priority::High,
            Priority::Max,
        ];
        let names: Vec<&str> = all.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, ["min", "low", "default", "high", "max"]);
        assert!(Priority::High > Priority::Low);
    }

    #[tokio::test]
    async fn log_sink_accepts_everything() {
        LogSink.notify("Backup Complete", "done", Priority::Low).await;
        LogSink.notify("Backup Failed", "boom", Priority::Max).await;
    }
}
