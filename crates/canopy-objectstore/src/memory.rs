//! In-memory object store for testing and all-in-one deployments

use crate::{GetObjectOutput, ObjectStore, ObjectStoreError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::io::Cursor;
use std::sync::Arc;

/// An in-memory object store
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<DashSet<String>>,
    objects: Arc<DashMap<(String, String), Bytes>>,
}

impl MemoryObjectStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of objects stored
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Clear all objects, keeping buckets
    pub fn clear(&self) {
        self.objects.clear();
    }

    /// Whether a bucket has been created
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.contains(bucket)
    }

    /// Read an object directly, bypassing the streaming body
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// List keys stored in a bucket
    pub fn list_keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        if !self.buckets.contains(bucket) {
            return Err(ObjectStoreError::BucketNotFound(bucket.to_string()));
        }
        self.objects
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput> {
        let data = self.object(bucket, key).ok_or_else(|| ObjectStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        Ok(GetObjectOutput {
            content_length: data.len() as u64,
            body: Box::pin(Cursor::new(data)),
        })
    }

    async fn ensure_bucket_exists(&self, bucket: &str, _region: &str) -> Result<()> {
        self.buckets.insert(bucket.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryObjectStore::new();
        store.ensure_bucket_exists("registry", "eu-west-1").await.unwrap();

        store
            .put_object("registry", "org/name/aws/1.0.0.zip", Bytes::from_static(b"zip"))
            .await
            .unwrap();

        let mut object = store.get_object("registry", "org/name/aws/1.0.0.zip").await.unwrap();
        let mut data = Vec::new();
        object.body.read_to_end(&mut data).await.unwrap();

        assert_eq!(object.content_length, 3);
        assert_eq!(data, b"zip");
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryObjectStore::new();
        store.ensure_bucket_exists("registry", "eu-west-1").await.unwrap();

        store.put_object("registry", "k", Bytes::from_static(b"one")).await.unwrap();
        store.put_object("registry", "k", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.object("registry", "k").unwrap().as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let store = MemoryObjectStore::new();
        store.ensure_bucket_exists("registry", "eu-west-1").await.unwrap();

        let err = store.get_object("registry", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_without_bucket() {
        let store = MemoryObjectStore::new();

        let result = store.put_object("nope", "k", Bytes::new()).await;
        assert!(matches!(result, Err(ObjectStoreError::BucketNotFound(_))));
    }

    #[tokio::test]
    async fn test_ensure_bucket_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.ensure_bucket_exists("registry", "eu-west-1").await.unwrap();
        store.put_object("registry", "k", Bytes::from_static(b"x")).await.unwrap();
        store.ensure_bucket_exists("registry", "eu-west-1").await.unwrap();

        assert!(store.has_bucket("registry"));
        assert_eq!(store.list_keys("registry"), vec!["k".to_string()]);
    }
}
