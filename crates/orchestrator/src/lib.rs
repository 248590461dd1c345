//! Pipeline orchestrator for pitch-video jobs
//!
//! Drives a video job through
//! `uploaded -> transcribing -> analyzing -> completed`, with `failed`
//! reachable from any non-terminal state. All collaborators (media
//! store, job store, transcription provider, analysis engine,
//! notifier) are injected at construction so tests can substitute
//! fakes.
//!
//! Triggers may be delivered more than once and concurrently for the
//! same job; the compare-and-swap claim on the job store guarantees
//! at most one active run per job id. Provider failures and timeouts
//! are terminal for the run — recovery is the explicit retry
//! operation, never an automatic loop.

pub mod dispatcher;
pub mod notifier;

pub use dispatcher::{DispatcherConfig, UploadDispatcher};
pub use notifier::{LogNotifier, Notifier, NotifierConfig, NotifierError, WebhookNotifier};

use pitchlink_analysis::AnalysisEngine;
use pitchlink_common::{JobStatus, PipelineError, Result, VideoJob};
use pitchlink_storage::{JobStore, MediaStore, StorageError};
use pitchlink_transcription::TranscriptionProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Bounded timeouts for the two provider suspension points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Timeout applied to each transcription call, in seconds
    pub transcription_timeout_secs: u64,

    /// Timeout applied to each analysis call, in seconds
    pub analysis_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transcription_timeout_secs: std::env::var("PITCHLINK_TRANSCRIPTION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            analysis_timeout_secs: std::env::var("PITCHLINK_ANALYSIS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}

/// Outcome of a trigger delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This call ran the pipeline to a terminal state
    Processed,
    /// The job was not in `uploaded` (duplicate or out-of-order
    /// delivery); nothing was touched
    AlreadyHandled,
}

/// Orchestrator over injected collaborators
pub struct PipelineOrchestrator {
    jobs: Arc<dyn JobStore>,
    media: Arc<dyn MediaStore>,
    transcriber: Arc<dyn TranscriptionProvider>,
    analyzer: Arc<dyn AnalysisEngine>,
    notifier: Option<Arc<dyn Notifier>>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    /// Create an orchestrator
    pub fn new(
        jobs: Arc<dyn JobStore>,
        media: Arc<dyn MediaStore>,
        transcriber: Arc<dyn TranscriptionProvider>,
        analyzer: Arc<dyn AnalysisEngine>,
        notifier: Option<Arc<dyn Notifier>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            jobs,
            media,
            transcriber,
            analyzer,
            notifier,
            config,
        }
    }

    /// Process one upload trigger for `job_id`
    ///
    /// Duplicate and out-of-order deliveries are clean no-ops: the
    /// stored status must be exactly `uploaded`, and the claim to
    /// `transcribing` is a compare-and-swap only one concurrent caller
    /// can win.
    ///
    /// # Errors
    /// - `NotFound` when the job id is unknown
    /// - `StorageFailure` when the media bytes cannot be fetched (job
    ///   marked `failed`)
    /// - `UpstreamFailure` when a provider errors or times out (job
    ///   marked `failed`; no automatic retry)
    pub async fn handle_upload_event(&self, job_id: &str) -> Result<TriggerOutcome> {
        let job = match self.jobs.get(job_id).await {
            Ok(job) => job,
            Err(StorageError::NotFound(_)) => {
                return Err(PipelineError::NotFound(job_id.to_string()));
            }
            Err(e) => return Err(PipelineError::StorageFailure(e.to_string())),
        };

        if job.status != JobStatus::Uploaded {
            debug!(
                "Ignoring trigger for job {} in status {}",
                job_id, job.status
            );
            return Ok(TriggerOutcome::AlreadyHandled);
        }

        let claimed = self
            .jobs
            .claim_for_processing(job_id)
            .await
            .map_err(|e| PipelineError::StorageFailure(e.to_string()))?;

        if !claimed {
            debug!("Lost the processing claim for job {}", job_id);
            return Ok(TriggerOutcome::AlreadyHandled);
        }

        info!("Processing job {} (user {})", job_id, job.user_id);

        let media = match self.media.get(&job.storage_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let message = format!("media fetch failed for {}: {e}", job.storage_path);
                return Err(self.fail_storage(job_id, message).await);
            }
        };

        let transcription_bound = Duration::from_secs(self.config.transcription_timeout_secs);
        let transcript = match timeout(transcription_bound, self.transcriber.transcribe(&media))
            .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return self.fail_upstream(job_id, "transcription", e.to_string()).await;
            }
            Err(_) => {
                let message = format!(
                    "transcription timed out after {}s",
                    self.config.transcription_timeout_secs
                );
                return self.fail_upstream(job_id, "transcription", message).await;
            }
        };

        if let Err(e) = self.jobs.record_transcription(job_id, &transcript).await {
            let message = format!("could not persist transcript: {e}");
            return Err(self.fail_storage(job_id, message).await);
        }
        info!("Job {} transcribed ({} chars)", job_id, transcript.len());

        let analysis_bound = Duration::from_secs(self.config.analysis_timeout_secs);
        let analysis = match timeout(analysis_bound, self.analyzer.analyze(&transcript)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return self.fail_upstream(job_id, "analysis", e.to_string()).await;
            }
            Err(_) => {
                let message = format!(
                    "analysis timed out after {}s",
                    self.config.analysis_timeout_secs
                );
                return self.fail_upstream(job_id, "analysis", message).await;
            }
        };

        let completed = match self.jobs.record_completion(job_id, &analysis).await {
            Ok(job) => job,
            Err(e) => {
                let message = format!("could not persist analysis: {e}");
                return Err(self.fail_storage(job_id, message).await);
            }
        };
        info!("Job {} completed", job_id);

        // Fire-and-forget: a notification failure must not revert the job
        if let Some(notifier) = &self.notifier {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_completed(&completed).await {
                    warn!(
                        "Completion notification failed for job {}: {}",
                        completed.id, e
                    );
                }
            });
        }

        Ok(TriggerOutcome::Processed)
    }

    /// Explicit resubmission of a terminal job
    ///
    /// Resets the job to `uploaded`, clearing transcript, analysis and
    /// error, so a new trigger can process it from the start.
    ///
    /// # Errors
    /// - `NotFound` when the job id is unknown
    /// - `InvalidState` when the job is not terminal
    pub async fn retry(&self, job_id: &str) -> Result<VideoJob> {
        match self.jobs.reset_for_retry(job_id).await {
            Ok(job) => {
                info!("Job {} reset to uploaded for retry", job_id);
                Ok(job)
            }
            Err(StorageError::NotFound(_)) => Err(PipelineError::NotFound(job_id.to_string())),
            Err(StorageError::InvalidTransition { current, .. }) => {
                match JobStatus::from_name(&current) {
                    Some(status) => Err(PipelineError::InvalidState {
                        job_id: job_id.to_string(),
                        status,
                    }),
                    None => Err(PipelineError::StorageFailure(format!(
                        "job {job_id} has unknown status {current}"
                    ))),
                }
            }
            Err(e) => Err(PipelineError::StorageFailure(e.to_string())),
        }
    }

    /// Mark the job failed and preserve the message for the journal
    async fn fail(&self, job_id: &str, message: &str) -> Result<()> {
        error!("Job {} failed: {}", job_id, message);
        self.jobs
            .record_failure(job_id, message)
            .await
            .map_err(|e| PipelineError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    /// Storage failure after the claim: land the job in `failed` so it
    /// stays eligible for retry, best-effort, then surface the failure
    async fn fail_storage(&self, job_id: &str, message: String) -> PipelineError {
        error!("Job {} failed: {}", job_id, message);
        if let Err(e) = self.jobs.record_failure(job_id, &message).await {
            warn!("Could not record failure for job {}: {}", job_id, e);
        }
        PipelineError::StorageFailure(message)
    }

    /// Terminal provider failure: mark failed, then surface it
    async fn fail_upstream(
        &self,
        job_id: &str,
        provider: &str,
        message: String,
    ) -> Result<TriggerOutcome> {
        self.fail(job_id, &message).await?;
        Err(PipelineError::UpstreamFailure {
            provider: provider.to_string(),
            message,
        })
    }
}
