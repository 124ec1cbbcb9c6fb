//! Run notifications.
//!
//! A notification is sent once per run: on success after the repository has
//! been published, and on failure with the error that aborted the run. Runs
//! that find nothing new stay silent.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::PackageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub outcome: Outcome,
    pub subject: String,
    pub message: String,
}

impl Notification {
    /// A release was mirrored and the repository published.
    pub fn success(record: &PackageRecord, pool_urls: &[String], repository_url: &str) -> Self {
        let repository_url = repository_url.trim_end_matches('/');
        let mut message = format!(
            "Successfully processed Kiro IDE version {}\n\n\
             Release Details:\n\
             - Package: {}\n\
             - Version: {}\n\
             - Architecture: {}\n\
             - Download URL: {}\n\
             - Published: {}\n",
            record.version,
            record.package_name,
            record.version,
            record.architecture,
            record.deb_url,
            record.pub_date,
        );
        if !pool_urls.is_empty() {
            message.push_str("\nRepository files:\n");
            for url in pool_urls {
                message.push_str(&format!("- {}\n", url));
            }
        }
        message.push_str(&format!(
            "\nInstall with:\n\
             echo \"deb [trusted=yes arch=amd64] {}/ stable main\" | sudo tee /etc/apt/sources.list.d/kiro.list\n\
             sudo apt-get update\n\
             sudo apt-get install {}\n",
            repository_url, record.package_name
        ));

        Self {
            outcome: Outcome::Success,
            subject: format!("Kiro Debian Repository Updated - Version {}", record.version),
            message,
        }
    }

    /// A run aborted with `error` while doing `context`.
    pub fn failure(error: &Error, context: Option<&str>) -> Self {
        let mut message =
            "The Kiro Debian Repository Manager encountered an error:\n\n".to_string();
        if let Some(context) = context {
            message.push_str(&format!("Context: {}\n\n", context));
        }
        message.push_str(&format!(
            "Error Type: {}\nError Message: {}\n\nPlease check the logs for more details.",
            error.type_name(),
            error
        ));
        Self {
            outcome: Outcome::Failure,
            subject: "Kiro Debian Repository Manager - Processing Failed".to_string(),
            message,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Only logs notifications.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            outcome = ?notification.outcome,
            subject = %notification.subject,
            "Notification"
        );
        debug!(message = %notification.message, "Notification body");
        Ok(())
    }
}

/// POSTs notifications as JSON to per-outcome webhook URLs.
///
/// An outcome without a URL is not sent.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    success_url: Option<url::Url>,
    failure_url: Option<url::Url>,
}

impl WebhookNotifier {
    pub fn new(
        success_url: Option<url::Url>,
        failure_url: Option<url::Url>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build webhook client: {}", e)))?;
        Ok(Self {
            client,
            success_url,
            failure_url,
        })
    }

    fn url_for(&self, outcome: Outcome) -> Option<&url::Url> {
        match outcome {
            Outcome::Success => self.success_url.as_ref(),
            Outcome::Failure => self.failure_url.as_ref(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let Some(url) = self.url_for(notification.outcome) else {
            debug!(outcome = ?notification.outcome, "No webhook configured");
            return Ok(());
        };
        let response = self
            .client
            .post(url.clone())
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        info!(subject = %notification.subject, "Sent webhook notification");
        Ok(())
    }
}

/// Publishes notifications as JSON on a redis channel.
pub struct RedisNotifier {
    redis: ConnectionManager,
    channel: String,
}

impl RedisNotifier {
    pub fn new(redis: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            redis,
            channel: channel.into(),
        }
    }

    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("invalid redis URL: {}", e)))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;
        Ok(Self::new(redis, channel))
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let message = serde_json::to_string(notification)?;
        let mut redis = self.redis.clone();
        let _: () = redis
            .publish(&self.channel, message)
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;
        info!(channel = %self.channel, subject = %notification.subject, "Published notification");
        Ok(())
    }
}

/// Sends to every notifier, logging failures instead of returning them.
pub async fn send_best_effort(notifiers: &[Box<dyn Notifier>], notification: &Notification) {
    for notifier in notifiers {
        if let Err(e) = notifier.notify(notification).await {
            warn!(subject = %notification.subject, error = %e, "Failed to send notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ControlDefaults;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> PackageRecord {
        PackageRecord::new(
            &ControlDefaults::default(),
            "1.2.3",
            "2025-03-01",
            "https://cdn.example.com/kiro_1.2.3_amd64.deb",
        )
    }

    #[test]
    fn test_success_message() {
        let notification = Notification::success(
            &record(),
            &["https://repo.example.com/pool/main/k/kiro/kiro_1.2.3_amd64.deb".to_string()],
            "https://repo.example.com/",
        );
        assert_eq!(notification.subject, "Kiro Debian Repository Updated - Version 1.2.3");
        assert!(notification.message.contains("- Version: 1.2.3\n"));
        assert!(notification.message.contains("- Published: 2025-03-01\n"));
        assert!(notification
            .message
            .contains("- https://repo.example.com/pool/main/k/kiro/kiro_1.2.3_amd64.deb\n"));
        assert!(notification.message.contains("sudo apt-get install kiro\n"));
    }

    #[test]
    fn test_failure_message() {
        let error = Error::Metadata("no releases".to_string());
        let notification = Notification::failure(&error, Some("Fetching metadata"));
        assert_eq!(
            notification.subject,
            "Kiro Debian Repository Manager - Processing Failed"
        );
        assert!(notification.message.contains("Context: Fetching metadata\n"));
        assert!(notification.message.contains("Error Type: MetadataError\n"));
        assert!(notification
            .message
            .contains("Error Message: Invalid release metadata: no releases"));
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/failure"))
            .and(body_partial_json(serde_json::json!({"outcome": "failure"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            None,
            Some(format!("{}/failure", server.uri()).parse().unwrap()),
            Duration::from_secs(5),
        )
        .unwrap();

        let error = Error::Metadata("bad".to_string());
        notifier
            .notify(&Notification::failure(&error, None))
            .await
            .unwrap();
        // No success URL configured: nothing is sent.
        notifier
            .notify(&Notification::success(&record(), &[], "https://repo.example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            Some(server.uri().parse().unwrap()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = notifier
            .notify(&Notification::success(&record(), &[], "https://repo.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Notification(_)));
    }
}
