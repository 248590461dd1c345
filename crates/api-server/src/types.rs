//! API request and response types

use pitchlink_common::{AnalysisResult, JobStatus};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Query parameters accompanying an upload body
#[derive(Debug, Clone, Deserialize)]
pub struct UploadParams {
    /// Owner of the uploaded video
    pub user_id: String,
    /// Optional recording-session grouping key
    #[serde(default)]
    pub session_id: Option<String>,
    /// Use the lower-quality fast encoding profile
    #[serde(default)]
    pub fast: bool,
}

/// Response to a successful upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Identifier of the created job
    pub job_id: String,
    /// Object path the media was stored under
    pub storage_path: String,
    /// Initial job status (always `uploaded`)
    pub status: JobStatus,
    /// Whether the stored bytes are the compressed rendition; false
    /// means encoding failed and the original bytes were kept
    pub compressed: bool,
    /// Uploaded size in bytes
    pub input_size: u64,
    /// Stored size in bytes
    pub output_size: u64,
    /// `(input_size - output_size) / input_size`
    pub reduction_ratio: f64,
}

/// Response to a processing trigger
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    /// The triggered job
    pub job_id: String,
    /// `processed` when this call ran the pipeline, `already_handled`
    /// for duplicate or out-of-order deliveries
    pub outcome: String,
}

/// Journal query parameters; exactly one key must be present
#[derive(Debug, Clone, Deserialize)]
pub struct JobListParams {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Signed URL query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlParams {
    /// Stored object path, as returned by the upload response
    pub path: String,
    /// Link lifetime in seconds; defaults to one year
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// Signed URL response
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    /// Stored object path the URL resolves to
    pub path: String,
    /// Time-limited playback URL
    pub url: String,
    /// Lifetime the URL was signed with, in seconds
    pub expires_in_secs: u64,
}

/// Connection request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConnectionRequest {
    /// User initiating the request
    pub requester_id: String,
    /// User the request is addressed to
    pub target_id: String,
    /// Pitch video that motivated the request (optional)
    #[serde(default)]
    pub video_id: Option<String>,
    /// Analysis snapshot to attach (optional)
    #[serde(default)]
    pub analysis_data: Option<AnalysisResult>,
}

/// Error payload returned with non-2xx statuses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error description
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_params_defaults() {
        let params: UploadParams =
            serde_json::from_str(r#"{"user_id": "user-1"}"#).unwrap();
        assert_eq!(params.user_id, "user-1");
        assert!(params.session_id.is_none());
        assert!(!params.fast);
    }

    #[test]
    fn test_connection_body_optional_fields() {
        let body: CreateConnectionRequest = serde_json::from_str(
            r#"{"requester_id": "alice", "target_id": "bob"}"#,
        )
        .unwrap();
        assert!(body.video_id.is_none());
        assert!(body.analysis_data.is_none());
    }

    #[test]
    fn test_upload_response_serialization() {
        let response = UploadResponse {
            job_id: "job-1".to_string(),
            storage_path: "media/a.mp4".to_string(),
            status: JobStatus::Uploaded,
            compressed: true,
            input_size: 1000,
            output_size: 400,
            reduction_ratio: 0.6,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "uploaded");
        assert_eq!(json["reduction_ratio"], 0.6);
    }
}
