//! `backupd-notify`: operator notifications.
//!
//! Jobs report through the [`NotificationSink`] trait. [`NtfySink`] posts to
//! an ntfy topic; [`LogSink`] is used when no topic is configured.

pub mod error;
pub mod ntfy;
pub mod sink;

pub use error::{NotifyError, Result};
pub use ntfy::NtfySink;
pub use sink::{LogSink, NotificationSink, Priority};
