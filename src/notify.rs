//! Operator failure notifications.
//!
//! Components report failures through `NotificationSink`; delivery is
//! best-effort and never retried. The production sink posts to a configured
//! webhook. When no webhook is configured, notifications land in the log.

use crate::error::{BackupError, BackupResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

/// Delivers an operator alert. Implementations must not block the caller on
/// retries; a failed delivery is the caller's to log and move past.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> BackupResult<()>;
}

/// Builds the standard alert subject: `{site} - backup {timestamp}`.
pub fn alert_subject(site_name: &str) -> String {
    format!(
        "{} - backup {}",
        site_name,
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Posts alerts as JSON to an operator webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> BackupResult<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "subject": subject, "body": body }))
            .send()
            .await
            .map_err(|e| BackupError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackupError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Fallback sink used when no webhook is configured: the alert only reaches
/// the local log.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> BackupResult<()> {
        warn!("operator alert: {subject}: {body}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_alert_subject_contains_site() {
        let subject = alert_subject("mysite");
        assert!(subject.starts_with("mysite - backup "));
    }

    #[tokio::test]
    async fn test_webhook_notifier_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/alerts")
            .match_body(Matcher::PartialJson(json!({
                "subject": "mysite - backup",
                "body": "upload failed"
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/alerts", server.url()));
        notifier
            .notify("mysite - backup", "upload failed")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_failure_is_notification_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/alerts")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/alerts", server.url()));
        let err = notifier.notify("s", "b").await.unwrap_err();
        assert!(matches!(err, BackupError::Notification(_)));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        LogNotifier.notify("s", "b").await.unwrap();
    }
}
