//! API server binary entry point

use pitchlink_analysis::{AnalysisConfig, HttpAnalysisEngine};
use pitchlink_api_server::{start_server, ApiState};
use pitchlink_compressor::CompressionOptions;
use pitchlink_orchestrator::{
    DispatcherConfig, LogNotifier, Notifier, NotifierConfig, PipelineConfig, PipelineOrchestrator,
    UploadDispatcher, WebhookNotifier,
};
use pitchlink_storage::{
    ConnectionStore, JobStore, MediaStore, MemoryConnectionStore, MemoryJobStore, MemoryMediaStore,
    PostgresConnectionStore, PostgresJobStore, S3MediaStore, StorageConfig,
};
use pitchlink_transcription::{HttpTranscriptionProvider, TranscriptionConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitchlink=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("PITCHLINK_API_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let backend = std::env::var("PITCHLINK_BACKEND").unwrap_or_else(|_| "memory".to_string());

    let (jobs, media, connections): (
        Arc<dyn JobStore>,
        Arc<dyn MediaStore>,
        Arc<dyn ConnectionStore>,
    ) = match backend.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory storage; all state is lost on restart");
            (
                Arc::new(MemoryJobStore::new()),
                Arc::new(MemoryMediaStore::new()),
                Arc::new(MemoryConnectionStore::new()),
            )
        }
        "s3-postgres" => {
            let config = StorageConfig::default();

            let job_store = PostgresJobStore::new(config.postgres.clone()).await?;
            job_store.init_schema().await?;

            let connection_store = PostgresConnectionStore::new(config.postgres).await?;
            connection_store.init_schema().await?;

            let media_store = S3MediaStore::new(config.s3).await?;

            (
                Arc::new(job_store),
                Arc::new(media_store),
                Arc::new(connection_store),
            )
        }
        other => anyhow::bail!("unknown PITCHLINK_BACKEND: {other}"),
    };

    let transcriber = Arc::new(HttpTranscriptionProvider::new(TranscriptionConfig::default())?);
    let analyzer = Arc::new(HttpAnalysisEngine::new(AnalysisConfig::default())?);

    // Webhook notifications only when an endpoint is configured
    let notifier_config = NotifierConfig::default();
    let notifier: Arc<dyn Notifier> = if notifier_config.endpoint.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(WebhookNotifier::new(notifier_config)?)
    };

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        jobs.clone(),
        media.clone(),
        transcriber,
        analyzer,
        Some(notifier),
        PipelineConfig::default(),
    ));

    // Background sweep for jobs uploaded but never triggered
    let dispatcher = UploadDispatcher::new(
        orchestrator.clone(),
        jobs.clone(),
        DispatcherConfig::default(),
    );
    tokio::spawn(async move { dispatcher.run().await });

    let state = ApiState::new(
        orchestrator,
        jobs,
        media,
        connections,
        CompressionOptions::default(),
    );

    tracing::info!("Starting pitch-video pipeline API server ({backend} backend)");
    start_server(&addr, state).await?;

    Ok(())
}
