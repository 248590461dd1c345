//! Polling dispatcher for uploaded jobs
//!
//! Scans the job store for jobs still in `uploaded` and feeds them to
//! the orchestrator. Delivery is at-least-once by design: a job may be
//! picked up here and also triggered over the API, and the
//! orchestrator's claim makes the duplicate harmless.

use crate::{PipelineOrchestrator, TriggerOutcome};
use pitchlink_storage::JobStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Seconds between scans of the job store
    pub poll_interval_secs: u64,

    /// Maximum jobs picked up per scan
    pub batch_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: std::env::var("PITCHLINK_DISPATCH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            batch_size: std::env::var("PITCHLINK_DISPATCH_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
        }
    }
}

/// Background worker pairing a job store with an orchestrator
pub struct UploadDispatcher {
    orchestrator: Arc<PipelineOrchestrator>,
    jobs: Arc<dyn JobStore>,
    config: DispatcherConfig,
}

impl UploadDispatcher {
    /// Create a dispatcher
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        jobs: Arc<dyn JobStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            orchestrator,
            jobs,
            config,
        }
    }

    /// Run one scan and return how many jobs this scan processed
    ///
    /// Jobs another worker claimed first count as zero here; a failing
    /// job is logged and does not stop the rest of the batch.
    pub async fn run_once(&self) -> usize {
        let pending = match self.jobs.list_uploaded(self.config.batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Dispatcher scan failed: {}", e);
                return 0;
            }
        };

        if pending.is_empty() {
            return 0;
        }

        debug!("Dispatcher picked up {} uploaded job(s)", pending.len());

        let mut processed = 0;
        for job in pending {
            match self.orchestrator.handle_upload_event(&job.id).await {
                Ok(TriggerOutcome::Processed) => processed += 1,
                Ok(TriggerOutcome::AlreadyHandled) => {
                    debug!("Job {} was already picked up elsewhere", job.id);
                }
                Err(e) => {
                    warn!("Dispatched job {} failed: {}", job.id, e);
                }
            }
        }

        processed
    }

    /// Poll forever at the configured interval
    pub async fn run(&self) {
        info!(
            "Upload dispatcher polling every {}s (batch size {})",
            self.config.poll_interval_secs, self.config.batch_size
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        loop {
            ticker.tick().await;
            let processed = self.run_once().await;
            if processed > 0 {
                info!("Dispatcher processed {} job(s)", processed);
            }
        }
    }
}
