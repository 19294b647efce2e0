//! # Canopy Object Store
//!
//! Object storage layer for the Canopy registry.
//!
//! This crate provides:
//! - **Chunking**: Split payloads into bounded-size chunks for streaming transfer
//! - **Object operations**: Put and get whole objects by bucket and key
//! - **Bucket bootstrap**: Idempotent bucket creation at startup
//! - **Backends**: S3-compatible stores and an in-memory store for tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Chunked Storage Service        │
//! ├─────────────────────────────────────────┤
//! │   Chunker        │   ObjectStore Trait  │
//! ├──────────────────┼──────────┬───────────┤
//! │                  │ S3Store  │MemoryStore│
//! ├──────────────────┴──────────┴───────────┤
//! │        S3 / LocalStack / MinIO          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use canopy_objectstore::{MemoryObjectStore, ObjectStore};
//!
//! let store = MemoryObjectStore::new();
//! store.ensure_bucket_exists("registry", "eu-west-1").await?;
//! store.put_object("registry", "org/name/aws/1.0.0.zip", data).await?;
//! let object = store.get_object("registry", "org/name/aws/1.0.0.zip").await?;
//! ```

pub mod chunker;
pub mod error;
pub mod memory;
pub mod s3;

pub use chunker::{Chunker, ChunkerConfig, Chunks, Reassembler};
pub use error::{ObjectStoreError, Result};
pub use memory::MemoryObjectStore;
pub use s3::{S3Config, S3ObjectStore};

use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Default chunk size (64 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum chunk size (4 MB, the default RPC message limit)
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Readable body of a stored object
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// An object fetched from the store
pub struct GetObjectOutput {
    /// Object content, consumed in a single forward pass
    pub body: ObjectBody,
    /// Length declared by the store for this object
    pub content_length: u64,
}

impl std::fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Trait for object storage backends
///
/// Implementations must be safe for concurrent use by many in-flight calls.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a whole object under `key`
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()>;

    /// Fetch an object and its declared length
    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput>;

    /// Create the bucket unless it already exists
    async fn ensure_bucket_exists(&self, bucket: &str, region: &str) -> Result<()>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<S> {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        (**self).put_object(bucket, key, body).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput> {
        (**self).get_object(bucket, key).await
    }

    async fn ensure_bucket_exists(&self, bucket: &str, region: &str) -> Result<()> {
        (**self).ensure_bucket_exists(bucket, region).await
    }
}
