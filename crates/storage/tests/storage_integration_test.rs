//! Integration tests for storage backends
//!
//! These tests require live instances of `MinIO` and `PostgreSQL`.
//! Start services with: `docker-compose up -d`
//!
//! Run tests with: `cargo test --package pitchlink-storage --test storage_integration_test -- --ignored --nocapture`
//!
//! All tests are marked with #[ignore] to prevent running in CI without live services.

use pitchlink_common::{AnalysisResult, ConnectionRequest, JobStatus, VideoJob};
use pitchlink_storage::*;

/// Check if `MinIO` is available
async fn is_minio_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:9000")
        .await
        .is_ok()
}

/// Check if `PostgreSQL` is available
async fn is_postgres_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:5432")
        .await
        .is_ok()
}

fn minio_config() -> S3Config {
    S3Config {
        bucket: "pitchlink-media".to_string(),
        region: "us-east-1".to_string(),
        endpoint: Some("http://localhost:9000".to_string()),
        access_key_id: "minioadmin".to_string(),
        secret_access_key: "minioadmin".to_string(),
        prefix: "test/".to_string(),
    }
}

fn postgres_config() -> PostgresConfig {
    PostgresConfig {
        host: "localhost".to_string(),
        port: 5432,
        database: "pitchlink".to_string(),
        user: "postgres".to_string(),
        password: "postgres".to_string(),
    }
}

// ============================================================================
// MinIO Media Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires MinIO running on localhost:9000
async fn test_minio_put_get_and_sign() {
    if !is_minio_available().await {
        eprintln!("MinIO not available on 127.0.0.1:9000");
        eprintln!("Start with: docker-compose up -d minio");
        eprintln!("Skipping test_minio_put_get_and_sign");
        return;
    }

    let store = S3MediaStore::new(minio_config())
        .await
        .expect("Failed to create media store client");

    let data = b"not a real mp4, but bytes travel the same";

    let path = store.put(data).await.expect("Failed to store blob");
    assert!(path.starts_with("media/"));
    assert!(path.ends_with(".mp4"));

    let retrieved = store.get(&path).await.expect("Failed to retrieve blob");
    assert_eq!(retrieved, data);

    let url = store
        .signed_url(&path, 3600)
        .await
        .expect("Failed to presign URL");
    assert!(url.contains(&path));
    assert!(url.contains("X-Amz-Expires=3600"));

    let missing = store.get("media/no-such-object.mp4").await;
    assert!(matches!(missing, Err(StorageError::NotFound(_))));

    println!("✅ MinIO integration test passed: put, get, signed URL, missing key");
}

// ============================================================================
// PostgreSQL Job Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_postgres_job_lifecycle() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Start with: docker-compose up -d postgres");
        eprintln!("Skipping test_postgres_job_lifecycle");
        return;
    }

    let store = PostgresJobStore::new(postgres_config())
        .await
        .expect("Failed to connect");
    store.init_schema().await.expect("Failed to init schema");

    let job = VideoJob::new("it-user-1", Some("it-session-1"), "media/it-1.mp4");
    store.insert(&job).await.expect("Failed to insert job");

    // CAS claim: first wins, second loses
    assert!(store.claim_for_processing(&job.id).await.expect("claim"));
    assert!(!store.claim_for_processing(&job.id).await.expect("claim"));

    store
        .record_transcription(&job.id, "an integration-test transcript")
        .await
        .expect("Failed to record transcript");

    let analysis = AnalysisResult {
        archetype: Some("builder".to_string()),
        summary: Some("integration summary".to_string()),
        score: Some(0.75),
        ..Default::default()
    };
    store
        .record_completion(&job.id, &analysis)
        .await
        .expect("Failed to record completion");

    let stored = store.get(&job.id).await.expect("Failed to fetch job");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(
        stored.transcription_text.as_deref(),
        Some("an integration-test transcript")
    );
    assert_eq!(stored.analysis.expect("analysis missing").score, Some(0.75));

    println!("✅ PostgreSQL job lifecycle test passed: insert, claim, transcript, completion");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_postgres_retry_resets_failed_job() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_postgres_retry_resets_failed_job");
        return;
    }

    let store = PostgresJobStore::new(postgres_config())
        .await
        .expect("Failed to connect");
    store.init_schema().await.expect("Failed to init schema");

    let job = VideoJob::new("it-user-2", None, "media/it-2.mp4");
    store.insert(&job).await.expect("Failed to insert job");

    store.claim_for_processing(&job.id).await.expect("claim");
    store
        .record_failure(&job.id, "integration-test failure")
        .await
        .expect("Failed to record failure");

    // Retry is only valid from a terminal state
    let reset = store.reset_for_retry(&job.id).await.expect("reset");
    assert_eq!(reset.status, JobStatus::Uploaded);
    assert!(reset.error_message.is_none());
    assert!(reset.transcription_text.is_none());

    let premature = store.reset_for_retry(&job.id).await;
    assert!(matches!(
        premature,
        Err(StorageError::InvalidTransition { .. })
    ));

    println!("✅ PostgreSQL retry test passed: failure, reset, invalid reset");
}

// ============================================================================
// PostgreSQL Connection Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_postgres_connection_pair_uniqueness() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_postgres_connection_pair_uniqueness");
        return;
    }

    let store = PostgresConnectionStore::new(postgres_config())
        .await
        .expect("Failed to connect");
    store.init_schema().await.expect("Failed to init schema");

    // Fresh ids per run so reruns do not collide with old rows
    let a = format!("it-{}", uuid::Uuid::new_v4());
    let b = format!("it-{}", uuid::Uuid::new_v4());

    let request = ConnectionRequest::new(&a, &b, None, None);
    store.insert(&request).await.expect("Failed to insert");

    // Same direction duplicates conflict
    let duplicate = ConnectionRequest::new(&a, &b, None, None);
    assert!(matches!(
        store.insert(&duplicate).await,
        Err(StorageError::Conflict(_))
    ));

    // Reversed direction is the same unordered pair
    let reversed = ConnectionRequest::new(&b, &a, None, None);
    assert!(matches!(
        store.insert(&reversed).await,
        Err(StorageError::Conflict(_))
    ));

    let found = store
        .get_for_pair(&a, &b)
        .await
        .expect("Failed to query pair")
        .expect("pair should exist");
    assert_eq!(found.requester_id, a);

    println!("✅ PostgreSQL connection uniqueness test passed: insert, duplicate, reversed");
}
