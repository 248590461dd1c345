//! Media store backed by S3/MinIO
//!
//! Durable object storage for raw and compressed video blobs. The
//! pipeline only ever puts a blob once, fetches it back for
//! processing, and issues signed URLs for playback.

use crate::{StorageError, StorageResult};
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default signed-URL lifetime when the caller does not specify one: one year
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 31_536_000;

/// S3/MinIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-west-2") or "us-east-1" for `MinIO`
    pub region: String,

    /// S3 endpoint (custom for `MinIO`, empty for AWS S3)
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Path prefix for all objects (e.g., "pitch-videos/")
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "pitchlink-media".to_string(),
            region: "us-west-2".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            prefix: String::new(),
        }
    }
}

/// Media store contract
#[async_trait::async_trait]
pub trait MediaStore: Send + Sync {
    /// Store a media blob, returning the path it can be fetched under
    async fn put(&self, data: &[u8]) -> StorageResult<String>;

    /// Retrieve a media blob by path
    async fn get(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Issue a time-limited playback URL for a stored blob
    async fn signed_url(&self, path: &str, ttl_secs: u64) -> StorageResult<String>;
}

/// S3/MinIO media store implementation
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3MediaStore {
    /// Create a new S3 media store client
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "pitchlink-storage",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Set custom endpoint for MinIO
        if let Some(endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix,
        })
    }

    /// Combine prefix with key
    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }
}

#[async_trait::async_trait]
impl MediaStore for S3MediaStore {
    async fn put(&self, data: &[u8]) -> StorageResult<String> {
        let path = format!("media/{}.mp4", Uuid::new_v4());
        let full_key = self.full_key(&path);
        let byte_stream = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(byte_stream)
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(path)
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let full_key = self.full_key(path);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound(full_key.clone())
                } else {
                    StorageError::S3Error(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn signed_url(&self, path: &str, ttl_secs: u64) -> StorageResult<String> {
        let full_key = self.full_key(path);

        let presigning = PresigningConfig::expires_in(Duration::from_secs(ttl_secs))
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// In-memory media store for tests and local mode
#[derive(Default)]
pub struct MemoryMediaStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryMediaStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MediaStore for MemoryMediaStore {
    async fn put(&self, data: &[u8]) -> StorageResult<String> {
        let path = format!("media/{}.mp4", Uuid::new_v4());
        self.blobs.write().await.insert(path.clone(), data.to_vec());
        Ok(path)
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn signed_url(&self, path: &str, ttl_secs: u64) -> StorageResult<String> {
        if !self.blobs.read().await.contains_key(path) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(format!("memory://{path}?expires_in={ttl_secs}"))
    }
}
