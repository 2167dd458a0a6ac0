use async_trait::async_trait;
use aws_sdk_s3 as s3;
use axum::body::Bytes;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::StorageConfig;

/// StorageError
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No credentials were supplied at startup.
    #[error("file storage not configured")]
    NotConfigured,

    #[error("upload failed: {0}")]
    Upload(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Defines the abstract contract for all interactions with the object storage layer.
/// This trait allows us to swap the concrete implementation (the real S3 client in
/// production, the in-memory mock during testing) without affecting the calling handlers.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the `Env::Local` setup
    /// to provision the bucket in MinIO.
    async fn ensure_bucket_exists(&self);

    /// Writes `body` under `key` and returns the object's public URL.
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, StorageError>;

    /// The public URL an object stored under `key` is served from.
    fn public_url(&self, key: &str) -> String;

    /// False when no backing store is available; upload and download
    /// endpoints refuse to run in that case.
    fn is_configured(&self) -> bool {
        true
    }
}

// 2. The Real Implementation (S3/MinIO/Supabase)
/// S3StorageClient
///
/// The concrete implementation using the AWS SDK for S3. Due to S3 compatibility,
/// this client transparently handles connections to:
/// - **Local:** Dockerized MinIO instance.
/// - **Production:** Supabase Storage endpoint.
///
/// The `force_path_style(true)` is critical for MinIO and Supabase compatibility.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Constructs the S3 client from the storage section of `AppConfig`.
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = s3::config::Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let s3_config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .region(s3::config::Region::new(config.region.clone()))
            .behavior_version_latest()
            // Path-style addressing (http://endpoint/bucket/key) is what MinIO and
            // the Supabase Storage gateway expect.
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
            bucket_name: config.bucket.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// CreateBucket fails harmlessly when the bucket already exists, so this is
    /// safe to call at every startup.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket_name, key)
    }
}

/// UnconfiguredStorage
///
/// Stand-in used when the deployment supplied no storage credentials. Every
/// write fails with `StorageError::NotConfigured`.
#[derive(Clone, Default)]
pub struct UnconfiguredStorage;

#[async_trait]
impl StorageService for UnconfiguredStorage {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(&self, _key: &str, _body: Bytes, _content_type: &str) -> Result<String, StorageError> {
        Err(StorageError::NotConfigured)
    }

    fn public_url(&self, key: &str) -> String {
        key.to_string()
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// sanitize_file_name
///
/// Replaces every character outside `[A-Za-z0-9.-]` with `_`, which also strips
/// any path separators from a user-supplied file name.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// object_key
///
/// Storage key for a new upload: `<unix millis>-<sanitized name>`.
pub fn object_key(original_name: &str) -> String {
    format!(
        "{}-{}",
        chrono::Utc::now().timestamp_millis(),
        sanitize_file_name(original_name)
    )
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// A mock implementation of `StorageService` used by the test suites. It keeps
/// the keys it was asked to write so tests can assert whether an upload reached
/// the store at all.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all uploads return a simulated failure.
    pub should_fail: bool,
    uploads: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Keys successfully written so far, in order.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(&self, key: &str, _body: Bytes, _content_type: &str) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Upload(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }

        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());

        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", key)
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
