//! Analysis engine boundary
//!
//! Derives structured signals (archetype classification, match score)
//! from transcript text. Like transcription, this is a remote
//! collaborator behind a narrow contract with a bounded timeout.

use pitchlink_common::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Analysis errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request timed out after {0}s")]
    Timeout(u64),

    #[error("analysis engine error: {0}")]
    Engine(String),

    #[error("invalid engine response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Analysis contract: transcript text in, structured signals out
#[async_trait::async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Analyze a transcript
    async fn analyze(&self, transcript: &str) -> Result<AnalysisResult>;
}

/// HTTP analysis engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Engine endpoint accepting a JSON transcript payload
    pub endpoint: String,

    /// Bearer token for the engine
    pub api_key: String,

    /// Whether to request a match score with each analysis
    pub score_matches: bool,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("PITCHLINK_ANALYSIS_URL")
                .unwrap_or_else(|_| "http://localhost:9090/v1/analyze".to_string()),
            api_key: std::env::var("PITCHLINK_ANALYSIS_API_KEY").unwrap_or_default(),
            score_matches: true,
            timeout_secs: std::env::var("PITCHLINK_ANALYSIS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}

/// Engine request body
#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    transcript: &'a str,
    score: bool,
}

/// HTTP analysis client
pub struct HttpAnalysisEngine {
    client: reqwest::Client,
    config: AnalysisConfig,
}

impl HttpAnalysisEngine {
    /// Create a new client with the configured request timeout
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "analysis endpoint is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl AnalysisEngine for HttpAnalysisEngine {
    async fn analyze(&self, transcript: &str) -> Result<AnalysisResult> {
        debug!(
            "Sending {}-char transcript to analysis engine at {}",
            transcript.len(),
            self.config.endpoint
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&AnalysisRequest {
                transcript,
                score: self.config.score_matches,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout(self.config.timeout_secs)
                } else {
                    AnalysisError::Engine(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Engine(format!(
                "engine returned {status}: {body}"
            )));
        }

        let result: AnalysisResult = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

        if self.config.score_matches && result.score.is_none() {
            return Err(AnalysisError::InvalidResponse(
                "match scoring was requested but no score returned".to_string(),
            ));
        }

        Ok(result)
    }
}
