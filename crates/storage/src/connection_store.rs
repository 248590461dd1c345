//! Connection-request persistence
//!
//! Creation must be idempotent for an unordered user pair: the
//! existence check and the insert are a single atomic operation, so a
//! race between concurrent callers produces one row and one conflict,
//! never a duplicate. In `PostgreSQL` that atomicity comes from a
//! unique expression index on the normalized pair; in memory, from a
//! single mutex over the map.

use crate::{PostgresConfig, StorageError, StorageResult};
use pitchlink_common::{ConnectionRequest, ConnectionStatus};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row};

/// Connection store contract
#[async_trait::async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Persist a new request; `Conflict` when the unordered pair
    /// already has one
    async fn insert(&self, request: &ConnectionRequest) -> StorageResult<()>;

    /// Fetch the request for an unordered pair, if any
    async fn get_for_pair(&self, a: &str, b: &str) -> StorageResult<Option<ConnectionRequest>>;

    /// All requests a user participates in, `created_at` ascending
    async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<ConnectionRequest>>;
}

fn status_name(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Pending => "pending",
        ConnectionStatus::Accepted => "accepted",
        ConnectionStatus::Rejected => "rejected",
    }
}

fn status_from_name(name: &str) -> StorageResult<ConnectionStatus> {
    match name {
        "pending" => Ok(ConnectionStatus::Pending),
        "accepted" => Ok(ConnectionStatus::Accepted),
        "rejected" => Ok(ConnectionStatus::Rejected),
        other => Err(StorageError::SerializationError(format!(
            "unknown connection status: {other}"
        ))),
    }
}

/// `PostgreSQL` connection store implementation
pub struct PostgresConnectionStore {
    client: Client,
}

impl PostgresConnectionStore {
    /// Create a new `PostgreSQL` connection store client
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
                CREATE TABLE IF NOT EXISTS connection_requests (
                    id TEXT PRIMARY KEY,
                    requester_id TEXT NOT NULL,
                    target_id TEXT NOT NULL,
                    video_id TEXT,
                    status TEXT NOT NULL,
                    analysis_data JSONB,
                    match_score DOUBLE PRECISION,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                    CHECK (requester_id <> target_id)
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        // One request per unordered pair: the insert itself is the
        // existence check
        self.client
            .execute(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_connection_pair
                ON connection_requests (
                    LEAST(requester_id, target_id),
                    GREATEST(requester_id, target_id)
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_connection_requester ON connection_requests(requester_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_connection_target ON connection_requests(target_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("connection_requests schema initialized");

        Ok(())
    }
}

fn row_to_request(row: &Row) -> StorageResult<ConnectionRequest> {
    let status = status_from_name(&row.get::<_, String>("status"))?;

    let analysis_data = row
        .get::<_, Option<serde_json::Value>>("analysis_data")
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;

    Ok(ConnectionRequest {
        id: row.get("id"),
        requester_id: row.get("requester_id"),
        target_id: row.get("target_id"),
        video_id: row.get("video_id"),
        status,
        analysis_data,
        match_score: row.get("match_score"),
        created_at: row.get("created_at"),
    })
}

#[async_trait::async_trait]
impl ConnectionStore for PostgresConnectionStore {
    async fn insert(&self, request: &ConnectionRequest) -> StorageResult<()> {
        let analysis_data = request
            .analysis_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let result = self
            .client
            .execute(
                r"
                INSERT INTO connection_requests
                    (id, requester_id, target_id, video_id, status,
                     analysis_data, match_score, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
                &[
                    &request.id,
                    &request.requester_id,
                    &request.target_id,
                    &request.video_id,
                    &status_name(request.status),
                    &analysis_data,
                    &request.match_score,
                    &request.created_at,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StorageError::Conflict(format!(
                    "connection request already exists for {} and {}",
                    request.requester_id, request.target_id
                )))
            }
            Err(e) => Err(StorageError::PostgresError(e.to_string())),
        }
    }

    async fn get_for_pair(&self, a: &str, b: &str) -> StorageResult<Option<ConnectionRequest>> {
        let row = self
            .client
            .query_opt(
                r"
                SELECT * FROM connection_requests
                WHERE LEAST(requester_id, target_id) = LEAST($1, $2)
                  AND GREATEST(requester_id, target_id) = GREATEST($1, $2)
                ",
                &[&a, &b],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<ConnectionRequest>> {
        let rows = self
            .client
            .query(
                r"
                SELECT * FROM connection_requests
                WHERE requester_id = $1 OR target_id = $1
                ORDER BY created_at ASC
                ",
                &[&user_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        rows.iter().map(row_to_request).collect()
    }
}

/// In-memory connection store for tests and local mode
#[derive(Default)]
pub struct MemoryConnectionStore {
    requests: Mutex<HashMap<(String, String), ConnectionRequest>>,
}

impl MemoryConnectionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn insert(&self, request: &ConnectionRequest) -> StorageResult<()> {
        let (lo, hi) =
            ConnectionRequest::normalized_pair(&request.requester_id, &request.target_id);
        let key = (lo.to_string(), hi.to_string());

        let mut requests = self.requests.lock().await;
        if requests.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "connection request already exists for {} and {}",
                request.requester_id, request.target_id
            )));
        }
        requests.insert(key, request.clone());
        Ok(())
    }

    async fn get_for_pair(&self, a: &str, b: &str) -> StorageResult<Option<ConnectionRequest>> {
        let (lo, hi) = ConnectionRequest::normalized_pair(a, b);
        let key = (lo.to_string(), hi.to_string());
        Ok(self.requests.lock().await.get(&key).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<ConnectionRequest>> {
        let requests = self.requests.lock().await;
        let mut matched: Vec<ConnectionRequest> = requests
            .values()
            .filter(|r| r.requester_id == user_id || r.target_id == user_id)
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.created_at);
        Ok(matched)
    }
}
