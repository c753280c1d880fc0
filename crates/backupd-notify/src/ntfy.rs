use std::time::Duration;

use async_trait::async_trait;
use backupd_core::config::NtfyConfig;
use tracing::{debug, error};

use crate::error::{NotifyError, Result};
use crate::sink::{NotificationSink, Priority};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Publishes notifications to an ntfy topic.
pub struct NtfySink {
    client: reqwest::Client,
    topic_url: String,
    token: String,
    tags: Vec<String>,
}

impl NtfySink {
    pub fn new(config: &NtfyConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            topic_url: config.topic_url.clone(),
            token: config.token.clone(),
            tags: config.tags.clone(),
        }
    }

    /// POST one message and check the response status.
    pub async fn send(&self, title: &str, body: &str, priority: Priority) -> Result<()> {
        let mut request = self
            .client
            .post(&self.topic_url)
            .header("Title", title)
            .header("Priority", priority.as_str())
            .header("Tags", self.tags.join(","))
            .body(body.to_string());
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        match status {
            200 | 201 | 204 => {
                debug!(status, title, "ntfy message sent");
                Ok(())
            }
            _ => Err(NotifyError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl NotificationSink for NtfySink {
    async fn notify(&self, title: &str, body: &str, priority: Priority) {
        if let Err(e) = self.send(title, body, priority).await {
            error!(error = %e, title, "unable to send ntfy message");
        }
    }
}
