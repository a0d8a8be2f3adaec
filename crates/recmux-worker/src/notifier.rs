//! Operator alerts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{NotifierConfig, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> WorkerResult<()>;
}

/// Send `message`, logging instead of failing when delivery does not work.
pub async fn notify_best_effort(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.notify(message).await {
        warn!(error = %e, "Failed to send notification: {}", message);
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    topic: &'a str,
    message: &'a str,
}

/// Posts alerts to the notification service's send endpoint.
pub struct WebhookNotifier {
    url: String,
    api_key: String,
    topic: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> WorkerResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| WorkerError::config_error("NOTIFIER_ENDPOINT not set"))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| WorkerError::config_error("NOTIFIER_API_KEY not set"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: format!("{}/api/send/v1", endpoint.trim_end_matches('/')),
            api_key,
            topic: config.topic.clone(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> WorkerResult<()> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                topic: &self.topic,
                message,
            })
            .send()
            .await
            .map_err(|e| WorkerError::Notifier(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Notifier(format!("Failed to notify ({status}): {body}")));
        }
        Ok(())
    }
}

/// Writes alerts to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> WorkerResult<()> {
        info!("Notification: {}", message);
        Ok(())
    }
}

/// Webhook in production, log elsewhere.
pub fn create_notifier(config: &WorkerConfig) -> WorkerResult<Arc<dyn Notifier>> {
    if config.is_prod() {
        Ok(Arc::new(WebhookNotifier::new(&config.notifier)?))
    } else {
        Ok(Arc::new(LogNotifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_requires_endpoint() {
        let err = WebhookNotifier::new(&NotifierConfig::default()).err().unwrap();
        assert!(matches!(err, WorkerError::ConfigError(_)));

        let notifier = WebhookNotifier::new(&NotifierConfig {
            endpoint: Some("https://alerts.example.com/".to_string()),
            api_key: Some("k".to_string()),
            topic: "recmux".to_string(),
        })
        .unwrap();
        assert_eq!(notifier.url, "https://alerts.example.com/api/send/v1");
    }

    #[test]
    fn test_non_prod_logs() {
        let config = WorkerConfig::default();
        assert!(create_notifier(&config).is_ok());
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        struct Failing;

        #[async_trait]
        impl Notifier for Failing {
            async fn notify(&self, _message: &str) -> WorkerResult<()> {
                Err(WorkerError::Notifier("down".to_string()))
            }
        }

        notify_best_effort(&Failing, "hello").await;
    }
}
