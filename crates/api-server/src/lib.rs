//! REST API server for the pitch-video pipeline
//!
//! Exposes upload, trigger, retry, job queries, signed playback URLs
//! and connection requests over HTTP. All processing is delegated to
//! the orchestrator and matcher; handlers only translate between HTTP
//! and pipeline semantics.

mod handlers;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use pitchlink_compressor::CompressionOptions;
use pitchlink_matcher::Matcher;
use pitchlink_orchestrator::PipelineOrchestrator;
use pitchlink_storage::{ConnectionStore, JobStore, MediaStore};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Pipeline orchestrator handling triggers and retries
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Connection-request matcher
    pub matcher: Arc<Matcher>,
    /// Job store for queries and upload inserts
    pub jobs: Arc<dyn JobStore>,
    /// Media store for uploads and signed URLs
    pub media: Arc<dyn MediaStore>,
    /// Encoding profile applied to uploads
    pub compression: CompressionOptions,
}

impl ApiState {
    /// Assemble state from the injected pipeline parts
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        jobs: Arc<dyn JobStore>,
        media: Arc<dyn MediaStore>,
        connections: Arc<dyn ConnectionStore>,
        compression: CompressionOptions,
    ) -> Self {
        Self {
            orchestrator,
            matcher: Arc::new(Matcher::new(connections)),
            jobs,
            media,
            compression,
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Upload and processing lifecycle
        .route("/api/v1/uploads", post(upload_video))
        .route("/api/v1/jobs/{job_id}/process", post(trigger_job))
        .route("/api/v1/jobs/{job_id}/retry", post(retry_job))
        // Status and journal queries
        .route("/api/v1/jobs/{job_id}", get(get_job))
        .route("/api/v1/jobs", get(list_jobs))
        // Playback
        .route("/api/v1/media/signed-url", get(signed_media_url))
        // Matching
        .route("/api/v1/connections", post(create_connection))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
