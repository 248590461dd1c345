//! Durable video-job journal
//!
//! The job store owns every status write in the pipeline. Transitions
//! are conditional on the current status, so a concurrent duplicate
//! trigger can never advance a job twice: `claim_for_processing` is a
//! compare-and-swap from `uploaded` to `transcribing` that only one
//! caller can win. Jobs are never physically deleted; failed jobs
//! remain queryable for audit.

use crate::{PostgresConfig, StorageError, StorageResult};
use chrono::Utc;
use pitchlink_common::{AnalysisResult, JobStatus, VideoJob};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};

/// Job store contract
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a newly created job (status must be `uploaded`)
    async fn insert(&self, job: &VideoJob) -> StorageResult<()>;

    /// Fetch a job by id
    async fn get(&self, job_id: &str) -> StorageResult<VideoJob>;

    /// Atomically move `uploaded -> transcribing`
    ///
    /// Returns `true` when this caller won the claim; `false` when the
    /// job exists but is no longer `uploaded` (duplicate trigger).
    async fn claim_for_processing(&self, job_id: &str) -> StorageResult<bool>;

    /// Persist the transcript and move `transcribing -> analyzing`
    async fn record_transcription(&self, job_id: &str, text: &str) -> StorageResult<VideoJob>;

    /// Persist the analysis and move `analyzing -> completed`
    async fn record_completion(
        &self,
        job_id: &str,
        analysis: &AnalysisResult,
    ) -> StorageResult<VideoJob>;

    /// Move a non-terminal job to `failed`, preserving the message
    async fn record_failure(&self, job_id: &str, message: &str) -> StorageResult<VideoJob>;

    /// Explicit resubmission: reset a terminal job to `uploaded`,
    /// clearing transcript, analysis and error
    async fn reset_for_retry(&self, job_id: &str) -> StorageResult<VideoJob>;

    /// All jobs for a user, `created_at` ascending
    async fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<VideoJob>>;

    /// All jobs in a session, `created_at` ascending
    async fn list_by_session(&self, session_id: &str) -> StorageResult<Vec<VideoJob>>;

    /// Oldest jobs still in `uploaded`, for the dispatcher
    async fn list_uploaded(&self, limit: usize) -> StorageResult<Vec<VideoJob>>;
}

/// `PostgreSQL` job store implementation
pub struct PostgresJobStore {
    client: Client,
}

impl PostgresJobStore {
    /// Create a new `PostgreSQL` job store client
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        // Spawn connection in background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    /// Initialize database schema (create tables if not exist)
    pub async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS video_jobs (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    session_id TEXT,
                    storage_path TEXT NOT NULL,
                    status TEXT NOT NULL,
                    transcription_text TEXT,
                    analysis JSONB,
                    error_message TEXT,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_video_jobs_user ON video_jobs(user_id, created_at)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_video_jobs_session ON video_jobs(session_id, created_at)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_video_jobs_status ON video_jobs(status, created_at)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("video_jobs schema initialized");

        Ok(())
    }

    /// Run a conditional transition and explain a zero-row result
    async fn conditional_update(
        &self,
        job_id: &str,
        requested: JobStatus,
        statement: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> StorageResult<VideoJob> {
        let row = self
            .client
            .query_opt(statement, params)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        match row {
            Some(row) => row_to_job(&row),
            None => {
                let current = self
                    .client
                    .query_opt("SELECT status FROM video_jobs WHERE id = $1", &[&job_id])
                    .await
                    .map_err(|e| StorageError::PostgresError(e.to_string()))?;

                match current {
                    Some(row) => Err(StorageError::InvalidTransition {
                        job_id: job_id.to_string(),
                        current: row.get::<_, String>("status"),
                        requested: requested.name().to_string(),
                    }),
                    None => Err(StorageError::NotFound(job_id.to_string())),
                }
            }
        }
    }
}

fn row_to_job(row: &Row) -> StorageResult<VideoJob> {
    let status_name: String = row.get("status");
    let status = JobStatus::from_name(&status_name).ok_or_else(|| {
        StorageError::SerializationError(format!("unknown job status: {status_name}"))
    })?;

    let analysis = row
        .get::<_, Option<serde_json::Value>>("analysis")
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;

    Ok(VideoJob {
        id: row.get("id"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        storage_path: row.get("storage_path"),
        status,
        transcription_text: row.get("transcription_text"),
        analysis,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    async fn insert(&self, job: &VideoJob) -> StorageResult<()> {
        let analysis = job
            .analysis
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.client
            .execute(
                r"
                INSERT INTO video_jobs
                    (id, user_id, session_id, storage_path, status,
                     transcription_text, analysis, error_message, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ",
                &[
                    &job.id,
                    &job.user_id,
                    &job.session_id,
                    &job.storage_path,
                    &job.status.name(),
                    &job.transcription_text,
                    &analysis,
                    &job.error_message,
                    &job.created_at,
                    &job.updated_at,
                ],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, job_id: &str) -> StorageResult<VideoJob> {
        let row = self
            .client
            .query_opt("SELECT * FROM video_jobs WHERE id = $1", &[&job_id])
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(job_id.to_string()))?;

        row_to_job(&row)
    }

    async fn claim_for_processing(&self, job_id: &str) -> StorageResult<bool> {
        // Only one concurrent caller can win this conditional update
        let rows = self
            .client
            .execute(
                r"
                UPDATE video_jobs
                SET status = 'transcribing', updated_at = now()
                WHERE id = $1 AND status = 'uploaded'
                ",
                &[&job_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        if rows == 1 {
            return Ok(true);
        }

        // Distinguish a lost claim from an unknown job
        let exists = self
            .client
            .query_opt("SELECT 1 FROM video_jobs WHERE id = $1", &[&job_id])
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?
            .is_some();

        if exists {
            Ok(false)
        } else {
            Err(StorageError::NotFound(job_id.to_string()))
        }
    }

    async fn record_transcription(&self, job_id: &str, text: &str) -> StorageResult<VideoJob> {
        self.conditional_update(
            job_id,
            JobStatus::Analyzing,
            r"
            UPDATE video_jobs
            SET status = 'analyzing', transcription_text = $2, updated_at = now()
            WHERE id = $1 AND status = 'transcribing'
            RETURNING *
            ",
            &[&job_id, &text],
        )
        .await
    }

    async fn record_completion(
        &self,
        job_id: &str,
        analysis: &AnalysisResult,
    ) -> StorageResult<VideoJob> {
        let analysis = serde_json::to_value(analysis)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.conditional_update(
            job_id,
            JobStatus::Completed,
            r"
            UPDATE video_jobs
            SET status = 'completed', analysis = $2, updated_at = now()
            WHERE id = $1 AND status = 'analyzing'
            RETURNING *
            ",
            &[&job_id, &analysis],
        )
        .await
    }

    async fn record_failure(&self, job_id: &str, message: &str) -> StorageResult<VideoJob> {
        self.conditional_update(
            job_id,
            JobStatus::Failed,
            r"
            UPDATE video_jobs
            SET status = 'failed', error_message = $2, updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            RETURNING *
            ",
            &[&job_id, &message],
        )
        .await
    }

    async fn reset_for_retry(&self, job_id: &str) -> StorageResult<VideoJob> {
        self.conditional_update(
            job_id,
            JobStatus::Uploaded,
            r"
            UPDATE video_jobs
            SET status = 'uploaded', transcription_text = NULL, analysis = NULL,
                error_message = NULL, updated_at = now()
            WHERE id = $1 AND status IN ('completed', 'failed')
            RETURNING *
            ",
            &[&job_id],
        )
        .await
    }

    async fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<VideoJob>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM video_jobs WHERE user_id = $1 ORDER BY created_at ASC",
                &[&user_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        rows.iter().map(row_to_job).collect()
    }

    async fn list_by_session(&self, session_id: &str) -> StorageResult<Vec<VideoJob>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM video_jobs WHERE session_id = $1 ORDER BY created_at ASC",
                &[&session_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        rows.iter().map(row_to_job).collect()
    }

    async fn list_uploaded(&self, limit: usize) -> StorageResult<Vec<VideoJob>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(
                "SELECT * FROM video_jobs WHERE status = 'uploaded' ORDER BY created_at ASC LIMIT $1",
                &[&limit],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        rows.iter().map(row_to_job).collect()
    }
}

/// In-memory job store for tests and local mode
///
/// A single mutex over the whole map gives the same atomicity the
/// conditional `UPDATE` provides in `PostgreSQL`.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, VideoJob>>,
}

impl MemoryJobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &VideoJob) -> StorageResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(StorageError::Conflict(format!(
                "job already exists: {}",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> StorageResult<VideoJob> {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(job_id.to_string()))
    }

    async fn claim_for_processing(&self, job_id: &str) -> StorageResult<bool> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::NotFound(job_id.to_string()))?;

        if job.status != JobStatus::Uploaded {
            return Ok(false);
        }

        job.status = JobStatus::Transcribing;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_transcription(&self, job_id: &str, text: &str) -> StorageResult<VideoJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::NotFound(job_id.to_string()))?;

        if job.status != JobStatus::Transcribing {
            return Err(StorageError::InvalidTransition {
                job_id: job_id.to_string(),
                current: job.status.name().to_string(),
                requested: JobStatus::Analyzing.name().to_string(),
            });
        }

        job.transcription_text = Some(text.to_string());
        job.status = JobStatus::Analyzing;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn record_completion(
        &self,
        job_id: &str,
        analysis: &AnalysisResult,
    ) -> StorageResult<VideoJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::NotFound(job_id.to_string()))?;

        if job.status != JobStatus::Analyzing {
            return Err(StorageError::InvalidTransition {
                job_id: job_id.to_string(),
                current: job.status.name().to_string(),
                requested: JobStatus::Completed.name().to_string(),
            });
        }

        job.analysis = Some(analysis.clone());
        job.status = JobStatus::Completed;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn record_failure(&self, job_id: &str, message: &str) -> StorageResult<VideoJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::NotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(StorageError::InvalidTransition {
                job_id: job_id.to_string(),
                current: job.status.name().to_string(),
                requested: JobStatus::Failed.name().to_string(),
            });
        }

        job.error_message = Some(message.to_string());
        job.status = JobStatus::Failed;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn reset_for_retry(&self, job_id: &str) -> StorageResult<VideoJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::NotFound(job_id.to_string()))?;

        if !job.status.is_terminal() {
            return Err(StorageError::InvalidTransition {
                job_id: job_id.to_string(),
                current: job.status.name().to_string(),
                requested: JobStatus::Uploaded.name().to_string(),
            });
        }

        job.status = JobStatus::Uploaded;
        job.transcription_text = None;
        job.analysis = None;
        job.error_message = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<VideoJob>> {
        let jobs = self.jobs.lock().await;
        let mut matched: Vec<VideoJob> = jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by_key(|j| j.created_at);
        Ok(matched)
    }

    async fn list_by_session(&self, session_id: &str) -> StorageResult<Vec<VideoJob>> {
        let jobs = self.jobs.lock().await;
        let mut matched: Vec<VideoJob> = jobs
            .values()
            .filter(|j| j.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect();
        matched.sort_by_key(|j| j.created_at);
        Ok(matched)
    }

    async fn list_uploaded(&self, limit: usize) -> StorageResult<Vec<VideoJob>> {
        let jobs = self.jobs.lock().await;
        let mut matched: Vec<VideoJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Uploaded)
            .cloned()
            .collect();
        matched.sort_by_key(|j| j.created_at);
        matched.truncate(limit);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded_job(user: &str) -> VideoJob {
        VideoJob::new(user, None, "media/test.mp4")
    }

    #[tokio::test]
    async fn test_claim_is_won_exactly_once() {
        let store = MemoryJobStore::new();
        let job = uploaded_job("user-1");
        store.insert(&job).await.unwrap();

        assert!(store.claim_for_processing(&job.id).await.unwrap());
        assert!(!store.claim_for_processing(&job.id).await.unwrap());

        let stored = store.get(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Transcribing);
    }

    #[tokio::test]
    async fn test_claim_unknown_job() {
        let store = MemoryJobStore::new();
        let result = store.claim_for_processing("missing").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_transitions_follow_the_path() {
        let store = MemoryJobStore::new();
        let job = uploaded_job("user-1");
        store.insert(&job).await.unwrap();

        // Cannot record a transcript before the job is claimed
        let early = store.record_transcription(&job.id, "bonjour").await;
        assert!(matches!(early, Err(StorageError::InvalidTransition { .. })));

        store.claim_for_processing(&job.id).await.unwrap();
        let job_after = store.record_transcription(&job.id, "bonjour").await.unwrap();
        assert_eq!(job_after.status, JobStatus::Analyzing);
        assert_eq!(job_after.transcription_text.as_deref(), Some("bonjour"));

        let analysis = AnalysisResult {
            score: Some(0.8),
            ..Default::default()
        };
        let completed = store.record_completion(&job.id, &analysis).await.unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.analysis.unwrap().score, Some(0.8));
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let store = MemoryJobStore::new();
        let job = uploaded_job("user-1");
        store.insert(&job).await.unwrap();

        store.claim_for_processing(&job.id).await.unwrap();
        let failed = store
            .record_failure(&job.id, "transcription timed out")
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("transcription timed out")
        );

        // No further automatic transition out of failed
        let again = store.record_failure(&job.id, "again").await;
        assert!(matches!(again, Err(StorageError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_reset_for_retry_clears_results() {
        let store = MemoryJobStore::new();
        let job = uploaded_job("user-1");
        store.insert(&job).await.unwrap();

        store.claim_for_processing(&job.id).await.unwrap();
        store.record_failure(&job.id, "provider down").await.unwrap();

        let reset = store.reset_for_retry(&job.id).await.unwrap();
        assert_eq!(reset.status, JobStatus::Uploaded);
        assert!(reset.error_message.is_none());
        assert!(reset.transcription_text.is_none());

        // Retry of a non-terminal job is rejected
        let not_terminal = store.reset_for_retry(&job.id).await;
        assert!(matches!(
            not_terminal,
            Err(StorageError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_journal_queries_order_by_created_at() {
        let store = MemoryJobStore::new();

        let mut first = uploaded_job("user-1");
        first.session_id = Some("session-1".to_string());
        let mut second = uploaded_job("user-1");
        second.session_id = Some("session-1".to_string());
        second.created_at = first.created_at + chrono::Duration::seconds(5);

        // Insert newest first to prove ordering comes from created_at
        store.insert(&second).await.unwrap();
        store.insert(&first).await.unwrap();

        let by_user = store.list_by_user("user-1").await.unwrap();
        assert_eq!(by_user.len(), 2);
        assert_eq!(by_user[0].id, first.id);

        let by_session = store.list_by_session("session-1").await.unwrap();
        assert_eq!(by_session.len(), 2);
        assert_eq!(by_session[1].id, second.id);
    }

    #[tokio::test]
    async fn test_list_uploaded_skips_claimed_jobs() {
        let store = MemoryJobStore::new();
        let claimed = uploaded_job("user-1");
        let waiting = uploaded_job("user-2");
        store.insert(&claimed).await.unwrap();
        store.insert(&waiting).await.unwrap();

        store.claim_for_processing(&claimed.id).await.unwrap();

        let uploaded = store.list_uploaded(10).await.unwrap();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].id, waiting.id);
    }
}
