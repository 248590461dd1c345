//! Connection-request creation
//!
//! Given two user identifiers and optional analysis data, creates a
//! directional connection request. Uniqueness over the unordered user
//! pair is enforced by the connection store's atomic insert, so two
//! concurrent callers for the same pair produce one row and one
//! conflict. An existing request is never silently overwritten.

use pitchlink_common::{AnalysisResult, ConnectionRequest, PipelineError, Result};
use pitchlink_storage::{ConnectionStore, StorageError};
use std::sync::Arc;
use tracing::{info, warn};

/// Matcher over an injected connection store
pub struct Matcher {
    connections: Arc<dyn ConnectionStore>,
}

impl Matcher {
    /// Create a matcher backed by the given store
    pub fn new(connections: Arc<dyn ConnectionStore>) -> Self {
        Self { connections }
    }

    /// Create a pending connection request from `requester_id` to
    /// `target_id`
    ///
    /// `match_score` is copied from `analysis_data.score` when present.
    ///
    /// # Errors
    /// - `InvalidArgument` when the two ids are equal or empty; nothing
    ///   is persisted
    /// - `Conflict` when a request already exists for the unordered
    ///   pair, in either direction
    /// - `StorageFailure` when the store itself fails
    pub async fn request_connection(
        &self,
        requester_id: &str,
        target_id: &str,
        video_id: Option<&str>,
        analysis_data: Option<AnalysisResult>,
    ) -> Result<ConnectionRequest> {
        if requester_id.is_empty() || target_id.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "requester and target ids must be non-empty".to_string(),
            ));
        }

        if requester_id == target_id {
            return Err(PipelineError::InvalidArgument(format!(
                "user {requester_id} cannot request a connection with themselves"
            )));
        }

        let request = ConnectionRequest::new(requester_id, target_id, video_id, analysis_data);

        match self.connections.insert(&request).await {
            Ok(()) => {
                info!(
                    "Created connection request {} ({} -> {})",
                    request.id, requester_id, target_id
                );
                Ok(request)
            }
            Err(StorageError::Conflict(message)) => {
                warn!("Duplicate connection request rejected: {}", message);
                Err(PipelineError::Conflict)
            }
            Err(e) => Err(PipelineError::StorageFailure(e.to_string())),
        }
    }
}
