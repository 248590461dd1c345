//! Common types for the pitch-video processing and matching pipeline
//!
//! Defines the job and connection-request records shared across the
//! workspace, plus the pipeline error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {job_id} is not eligible (status: {status})")]
    InvalidState { job_id: String, status: JobStatus },

    #[error("{provider} failure: {message}")]
    UpstreamFailure { provider: String, message: String },

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("connection request already exists for this pair")]
    Conflict,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encoding failure: {0}")]
    EncodingFailure(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Processing status of a video job
///
/// Transitions are monotonic along
/// `uploaded -> transcribing -> analyzing -> completed`, with `failed`
/// reachable from any non-terminal state. Terminal jobs are re-entered
/// only by the explicit retry operation, which resets to `uploaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Media stored, waiting for a trigger
    Uploaded,
    /// Speech-to-text in flight
    Transcribing,
    /// Analysis engine in flight
    Analyzing,
    /// Transcript and analysis persisted
    Completed,
    /// Terminal failure, `error_message` set
    Failed,
}

impl JobStatus {
    /// Get the persisted status name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Transcribing => "transcribing",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a persisted status name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uploaded" => Some(Self::Uploaded),
            "transcribing" => Some(Self::Transcribing),
            "analyzing" => Some(Self::Analyzing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this status is terminal (no automatic transitions out)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if a transition to `next` is legal
    #[must_use]
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Uploaded, Self::Transcribing)
            | (Self::Transcribing, Self::Analyzing)
            | (Self::Analyzing, Self::Completed) => true,
            // Failure is reachable from any non-terminal state
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured signals derived from a transcript by the analysis engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Archetype/persona classification label
    #[serde(default)]
    pub archetype: Option<String>,

    /// Short natural-language summary of the pitch
    #[serde(default)]
    pub summary: Option<String>,

    /// Match score, present when match scoring was requested
    #[serde(default)]
    pub score: Option<f64>,

    /// Forward-compatible fields the engine may add
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One video's processing record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    /// Opaque unique identifier
    pub id: String,

    /// Owning user (weak reference, not owned by the job)
    pub user_id: String,

    /// Optional grouping key for multi-video sessions
    #[serde(default)]
    pub session_id: Option<String>,

    /// Location in the media store; set once, immutable after
    pub storage_path: String,

    /// Current pipeline status
    pub status: JobStatus,

    /// Set exactly once, on successful transcription
    #[serde(default)]
    pub transcription_text: Option<String>,

    /// Set exactly once, on successful analysis
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,

    /// Set only when `status == failed`
    #[serde(default)]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Advances on every state transition
    pub updated_at: DateTime<Utc>,
}

impl VideoJob {
    /// Create a new job in the `uploaded` state
    #[must_use]
    pub fn new(user_id: &str, session_id: Option<&str>, storage_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.map(ToString::to_string),
            storage_path: storage_path.to_string(),
            status: JobStatus::Uploaded,
            transcription_text: None,
            analysis: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status of a connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Awaiting the target's decision
    Pending,
    /// Accepted by the target
    Accepted,
    /// Rejected by the target
    Rejected,
}

/// A directional request from one user to connect with another
///
/// At most one request may exist for an unordered user pair at a time;
/// the matcher surfaces a conflict rather than duplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Unique identifier
    pub id: String,

    /// User who initiated the request
    pub requester_id: String,

    /// User the request is addressed to
    pub target_id: String,

    /// Originating video, if the request came out of the pipeline
    #[serde(default)]
    pub video_id: Option<String>,

    /// Acceptance state; creation always starts at `pending`
    pub status: ConnectionStatus,

    /// Analysis payload copied at creation time, immutable afterward
    #[serde(default)]
    pub analysis_data: Option<AnalysisResult>,

    /// Match score copied from `analysis_data.score` at creation
    #[serde(default)]
    pub match_score: Option<f64>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ConnectionRequest {
    /// Create a new pending request
    #[must_use]
    pub fn new(
        requester_id: &str,
        target_id: &str,
        video_id: Option<&str>,
        analysis_data: Option<AnalysisResult>,
    ) -> Self {
        let match_score = analysis_data.as_ref().and_then(|a| a.score);
        Self {
            id: Uuid::new_v4().to_string(),
            requester_id: requester_id.to_string(),
            target_id: target_id.to_string(),
            video_id: video_id.map(ToString::to_string),
            status: ConnectionStatus::Pending,
            analysis_data,
            match_score,
            created_at: Utc::now(),
        }
    }

    /// Normalize a user pair so `(a, b)` and `(b, a)` key identically
    #[must_use]
    pub fn normalized_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
        if a <= b { (a, b) } else { (b, a) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_path_is_monotonic() {
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::Transcribing));
        assert!(JobStatus::Transcribing.can_transition_to(JobStatus::Analyzing));
        assert!(JobStatus::Analyzing.can_transition_to(JobStatus::Completed));

        assert!(!JobStatus::Uploaded.can_transition_to(JobStatus::Analyzing));
        assert!(!JobStatus::Uploaded.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Analyzing.can_transition_to(JobStatus::Transcribing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Uploaded));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Transcribing.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Analyzing.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_status_names_round_trip() {
        for status in [
            JobStatus::Uploaded,
            JobStatus::Transcribing,
            JobStatus::Analyzing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_name(status.name()), Some(status));
        }
        assert_eq!(JobStatus::from_name("queued"), None);
    }

    #[test]
    fn test_new_job_starts_uploaded() {
        let job = VideoJob::new("user-1", Some("session-1"), "media/abc.mp4");
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.session_id.as_deref(), Some("session-1"));
        assert!(job.transcription_text.is_none());
        assert!(job.analysis.is_none());
        assert!(job.error_message.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_connection_request_copies_score() {
        let analysis = AnalysisResult {
            score: Some(0.8),
            ..Default::default()
        };
        let request = ConnectionRequest::new("alice", "bob", Some("video-1"), Some(analysis));
        assert_eq!(request.status, ConnectionStatus::Pending);
        assert_eq!(request.match_score, Some(0.8));
    }

    #[test]
    fn test_connection_request_without_analysis() {
        let request = ConnectionRequest::new("alice", "bob", None, None);
        assert!(request.analysis_data.is_none());
        assert!(request.match_score.is_none());
    }

    #[test]
    fn test_normalized_pair_is_order_insensitive() {
        assert_eq!(
            ConnectionRequest::normalized_pair("alice", "bob"),
            ConnectionRequest::normalized_pair("bob", "alice")
        );
    }

    #[test]
    fn test_analysis_result_deserializes_extra_fields() {
        let value: AnalysisResult = serde_json::from_str(
            r#"{"archetype": "visionary", "score": 0.8, "confidence": 0.95}"#,
        )
        .unwrap();
        assert_eq!(value.archetype.as_deref(), Some("visionary"));
        assert_eq!(value.score, Some(0.8));
        assert!(value.extra.contains_key("confidence"));
    }
}
