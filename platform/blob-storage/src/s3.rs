use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Duration;

use crate::{ObjectStore, StorageError, StorageResult};

/// Connection settings for an S3-compatible endpoint (AWS, MinIO).
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint; path-style addressing is used when set
    pub endpoint: Option<String>,
}

impl S3Config {
    /// `S3_BUCKET` (required), `S3_REGION` (default us-east-1), `S3_ENDPOINT`.
    pub fn from_env() -> Result<Self, String> {
        let bucket = std::env::var("S3_BUCKET").map_err(|_| "S3_BUCKET must be set".to_string())?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let endpoint = std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty());
        Ok(Self {
            bucket,
            region,
            endpoint,
        })
    }
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Credentials come from the standard AWS provider chain.
    pub async fn connect(config: S3Config) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(bucket = %config.bucket, endpoint = ?config.endpoint, "S3 object store configured");

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("put {}: {}", key, e)))?;

        tracing::debug!(key = %key, size, "Object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => StorageError::NotFound(key.to_string()),
                _ => StorageError::Backend(format!("get {}: {}", key, e)),
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("read {}: {}", key, e)))?;

        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("delete {}: {}", key, e)))?;
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let presigning =
            PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(format!("{}: {}", key, e)))?;

        Ok(request.uri().to_string())
    }
}
