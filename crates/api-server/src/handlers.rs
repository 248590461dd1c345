//! HTTP request handlers for API endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pitchlink_common::{PipelineError, VideoJob};
use pitchlink_compressor::{compress, CompressionOptions};
use pitchlink_orchestrator::TriggerOutcome;
use pitchlink_storage::{JobStore, MediaStore, StorageError, DEFAULT_SIGNED_URL_TTL_SECS};
use tracing::{info, warn};

use crate::types::{
    CreateConnectionRequest, ErrorResponse, HealthResponse, JobListParams, SignedUrlParams,
    SignedUrlResponse, TriggerResponse, UploadParams, UploadResponse,
};
use crate::ApiState;

/// Map a pipeline error onto an HTTP status and error payload
fn error_response(e: &PipelineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        PipelineError::Conflict | PipelineError::InvalidState { .. } => StatusCode::CONFLICT,
        PipelineError::UpstreamFailure { .. } | PipelineError::StorageFailure(_) => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::EncodingFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn storage_error(e: &StorageError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        StorageError::NotFound(message) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: message.clone(),
            }),
        ),
        _ => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        ),
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Accept a raw video body, compress it, store it, create the job
///
/// Encoding failure is not fatal: the original bytes are stored
/// unchanged and the response reports `compressed: false`.
pub async fn upload_video(
    State(state): State<ApiState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    if params.user_id.is_empty() {
        return Err(bad_request("user_id must be non-empty"));
    }
    if body.is_empty() {
        return Err(bad_request("upload body is empty"));
    }

    let input_size = body.len() as u64;
    let options = if params.fast {
        CompressionOptions::fast()
    } else {
        state.compression.clone()
    };

    // ffmpeg is a blocking subprocess; keep it off the runtime threads
    let input = body.to_vec();
    let encoded = tokio::task::spawn_blocking(move || compress(&input, &options))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("compression task failed: {e}"),
                }),
            )
        })?;

    let (stored_bytes, compressed, output_size, reduction_ratio) = match encoded {
        Ok(outcome) => (
            outcome.bytes,
            true,
            outcome.output_size,
            outcome.reduction_ratio,
        ),
        Err(e) => {
            warn!("Compression failed, storing original bytes: {}", e);
            (body.to_vec(), false, input_size, 0.0)
        }
    };

    let storage_path = state
        .media
        .put(&stored_bytes)
        .await
        .map_err(|e| storage_error(&e))?;

    let job = VideoJob::new(&params.user_id, params.session_id.as_deref(), &storage_path);
    state.jobs.insert(&job).await.map_err(|e| storage_error(&e))?;

    info!(
        "Uploaded job {} for user {} ({} -> {} bytes)",
        job.id, params.user_id, input_size, output_size
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            job_id: job.id,
            storage_path,
            status: job.status,
            compressed,
            input_size,
            output_size,
            reduction_ratio,
        }),
    ))
}

/// Trigger processing for an uploaded job
///
/// `202` when this call ran the pipeline, `200` when the delivery was
/// a duplicate and nothing happened.
pub async fn trigger_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    match state.orchestrator.handle_upload_event(&job_id).await {
        Ok(TriggerOutcome::Processed) => Ok((
            StatusCode::ACCEPTED,
            Json(TriggerResponse {
                job_id,
                outcome: "processed".to_string(),
            }),
        )),
        Ok(TriggerOutcome::AlreadyHandled) => Ok((
            StatusCode::OK,
            Json(TriggerResponse {
                job_id,
                outcome: "already_handled".to_string(),
            }),
        )),
        Err(e) => Err(error_response(&e)),
    }
}

/// Reset a terminal job to `uploaded` for reprocessing
pub async fn retry_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let job = state
        .orchestrator
        .retry(&job_id)
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(job))
}

/// Fetch the full job record
pub async fn get_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let job = state
        .jobs
        .get(&job_id)
        .await
        .map_err(|e| storage_error(&e))?;
    Ok(Json(job))
}

/// Journal query by user or session, `created_at` ascending
pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(params): Query<JobListParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let jobs = match (&params.user_id, &params.session_id) {
        (Some(user_id), None) => state
            .jobs
            .list_by_user(user_id)
            .await
            .map_err(|e| storage_error(&e))?,
        (None, Some(session_id)) => state
            .jobs
            .list_by_session(session_id)
            .await
            .map_err(|e| storage_error(&e))?,
        _ => {
            return Err(bad_request(
                "exactly one of user_id or session_id is required",
            ));
        }
    };
    Ok(Json(jobs))
}

/// Issue a time-limited playback URL for a stored object
pub async fn signed_media_url(
    State(state): State<ApiState>,
    Query(params): Query<SignedUrlParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let ttl_secs = params.ttl_secs.unwrap_or(DEFAULT_SIGNED_URL_TTL_SECS);
    if ttl_secs == 0 {
        return Err(bad_request("ttl_secs must be positive"));
    }

    let url = state
        .media
        .signed_url(&params.path, ttl_secs)
        .await
        .map_err(|e| storage_error(&e))?;

    Ok(Json(SignedUrlResponse {
        path: params.path,
        url,
        expires_in_secs: ttl_secs,
    }))
}

/// Create a connection request between two users
pub async fn create_connection(
    State(state): State<ApiState>,
    Json(body): Json<CreateConnectionRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let request = state
        .matcher
        .request_connection(
            &body.requester_id,
            &body.target_id,
            body.video_id.as_deref(),
            body.analysis_data,
        )
        .await
        .map_err(|e| error_response(&e))?;

    Ok((StatusCode::CREATED, Json(request)))
}
