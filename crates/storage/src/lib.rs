//! Storage layer for the pitch-video pipeline
//!
//! This crate defines the narrow contracts the pipeline uses to reach
//! its external collaborators, plus the concrete backends:
//! - **Media store (S3/MinIO)**: raw and compressed video blobs
//! - **Job store (`PostgreSQL`)**: the durable video-job journal
//! - **Connection store (`PostgreSQL`)**: connection requests between users
//!
//! In-memory implementations of all three contracts back the test
//! suites and the local development mode. All mutation of job and
//! connection records goes through these traits; nothing else writes
//! them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod connection_store;
pub mod job_store;
pub mod media_store;

pub use connection_store::{ConnectionStore, MemoryConnectionStore, PostgresConnectionStore};
pub use job_store::{JobStore, MemoryJobStore, PostgresJobStore};
pub use media_store::{
    MediaStore, MemoryMediaStore, S3Config, S3MediaStore, DEFAULT_SIGNED_URL_TTL_SECS,
};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid transition for job {job_id}: {current} -> {requested}")]
    InvalidTransition {
        job_id: String,
        current: String,
        requested: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "pitchlink".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// Complete storage configuration for all backends
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// S3/MinIO configuration for the media store
    #[serde(default)]
    pub s3: S3Config,

    /// `PostgreSQL` configuration for job and connection records
    #[serde(default)]
    pub postgres: PostgresConfig,
}
