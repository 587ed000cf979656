use crate::error::AlertError;
use log::info;
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// Outbound channel that delivers notification text
pub trait NotificationChannel: Send + Sync {
    fn send<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}

/// Slack incoming-webhook channel
///
/// Posts `{"text": ...}` to the webhook URL.
pub struct SlackWebhookChannel {
    client: Client,
    webhook_url: String,
}

/// Request body for Slack incoming webhooks
#[derive(Debug, Serialize)]
struct SlackMessage<'a> {
    text: &'a str,
}

impl SlackWebhookChannel {
    /// Create a new Slack channel
    ///
    /// # Arguments
    /// * `webhook_url` - Incoming webhook URL
    /// * `timeout` - Upper bound for a single delivery attempt
    ///
    /// # Errors
    ///
    /// Returns `AlertError::HttpError` if the HTTP client cannot be built.
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }
}

impl NotificationChannel for SlackWebhookChannel {
    fn send<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.webhook_url)
                .json(&SlackMessage { text })
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AlertError::NotificationFailed(format!(
                    "Slack webhook returned {}: {}",
                    status, error_text
                )));
            }

            Ok(())
        })
    }

    fn name(&self) -> &str {
        "slack"
    }
}

/// Channel that only writes notifications to the application log
#[derive(Debug, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn send<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            info!("NOTIFICATION: {}", text);
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// In-memory channel for testing
#[derive(Debug, Default)]
pub struct MockChannel {
    sent: Mutex<Vec<String>>,
    should_fail: bool,
    delay: Option<Duration>,
}

impl MockChannel {
    /// Create a channel that accepts every message
    pub fn success() -> Self {
        Self::default()
    }

    /// Create a channel that rejects every message
    pub fn failure() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Create a channel that waits `delay` before accepting
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Messages delivered so far
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl NotificationChannel for MockChannel {
    fn send<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.should_fail {
                return Err(AlertError::NotificationFailed(
                    "mock channel failure".to_string(),
                ));
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(text.to_string());
            }
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
