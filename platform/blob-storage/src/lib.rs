//! # Blob Storage
//!
//! Key-addressed object store. Every key a service writes lives under
//! `tenant/{tenant_id}/`, so a tenant's artifacts can be listed, retained
//! and purged as a unit. Writes are overwrite-idempotent: putting the same
//! key twice leaves one object.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::{S3Config, S3ObjectStore};

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("invalid presign request: {0}")]
    Presign(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Time-limited download URL.
    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String>;
}

/// `tenant/{tenant_id}/{path}` with any leading slashes on `path` dropped.
pub fn tenant_key(tenant_id: Uuid, path: &str) -> String {
    format!("tenant/{}/{}", tenant_id, path.trim_start_matches('/'))
}

/// Whether `key` lies under `tenant_id`'s prefix.
pub fn belongs_to(key: &str, tenant_id: Uuid) -> bool {
    key.starts_with(&format!("tenant/{}/", tenant_id))
}
