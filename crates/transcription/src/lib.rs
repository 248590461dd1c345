//! Speech-to-text provider boundary
//!
//! Transcription is a remote collaborator reached over the network.
//! This crate defines the narrow contract the orchestrator calls and
//! an HTTP client implementation with an explicit, bounded timeout.
//! A timeout is a provider failure like any other; there is no retry
//! loop here or anywhere downstream.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Transcription errors
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription request timed out after {0}s")]
    Timeout(u64),

    #[error("transcription provider error: {0}")]
    Provider(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for transcription operations
pub type Result<T> = std::result::Result<T, TranscriptionError>;

/// Speech-to-text contract: media bytes in, plain text out
///
/// No timestamps are required by this pipeline.
#[async_trait::async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe raw audio/video bytes to plain text
    async fn transcribe(&self, media: &[u8]) -> Result<String>;
}

/// HTTP speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Provider endpoint accepting raw media bytes
    pub endpoint: String,

    /// Bearer token for the provider
    pub api_key: String,

    /// Model identifier passed through to the provider
    pub model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("PITCHLINK_TRANSCRIPTION_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/audio/transcriptions".to_string()),
            api_key: std::env::var("PITCHLINK_TRANSCRIPTION_API_KEY").unwrap_or_default(),
            model: std::env::var("PITCHLINK_TRANSCRIPTION_MODEL")
                .unwrap_or_else(|_| "whisper-1".to_string()),
            timeout_secs: std::env::var("PITCHLINK_TRANSCRIPTION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        }
    }
}

/// Provider response body
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// HTTP speech-to-text client
pub struct HttpTranscriptionProvider {
    client: reqwest::Client,
    config: TranscriptionConfig,
}

impl HttpTranscriptionProvider {
    /// Create a new client with the configured request timeout
    pub fn new(config: TranscriptionConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(TranscriptionError::InvalidConfig(
                "transcription endpoint is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::InvalidConfig(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl TranscriptionProvider for HttpTranscriptionProvider {
    async fn transcribe(&self, media: &[u8]) -> Result<String> {
        debug!(
            "Sending {} bytes to transcription provider at {}",
            media.len(),
            self.config.endpoint
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .query(&[("model", self.config.model.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(media.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranscriptionError::Timeout(self.config.timeout_secs)
                } else {
                    TranscriptionError::Provider(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Provider(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        Ok(parsed.text)
    }
}
