//! Completion notifications
//!
//! Notification delivery is fire-and-forget: the orchestrator spawns
//! it after the `completed` write and a delivery failure never touches
//! job state.

use pitchlink_common::VideoJob;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Notifier contract
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Announce that a job reached `completed`
    async fn notify_completed(&self, job: &VideoJob) -> Result<(), NotifierError>;
}

/// Webhook notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Webhook endpoint the completion event is posted to
    pub endpoint: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("PITCHLINK_NOTIFY_URL").unwrap_or_default(),
            timeout_secs: std::env::var("PITCHLINK_NOTIFY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Completion event payload
#[derive(Debug, Serialize)]
struct CompletionEvent<'a> {
    job_id: &'a str,
    user_id: &'a str,
    session_id: Option<&'a str>,
}

/// Posts completion events to the external email/notification service
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    /// Create a new webhook notifier
    pub fn new(config: NotifierConfig) -> Result<Self, NotifierError> {
        if config.endpoint.is_empty() {
            return Err(NotifierError::InvalidConfig(
                "notification endpoint is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifierError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_completed(&self, job: &VideoJob) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CompletionEvent {
                job_id: &job.id,
                user_id: &job.user_id,
                session_id: job.session_id.as_deref(),
            })
            .send()
            .await
            .map_err(|e| NotifierError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Delivery(format!(
                "notification endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Notifier that only logs; used when no endpoint is configured
#[derive(Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify_completed(&self, job: &VideoJob) -> Result<(), NotifierError> {
        info!("Job {} completed for user {}", job.id, job.user_id);
        Ok(())
    }
}
