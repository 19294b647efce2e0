//! S3-compatible object store
//!
//! Works against AWS S3 as well as LocalStack and MinIO endpoints.

use crate::{GetObjectOutput, ObjectStore, ObjectStoreError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// Region that rejects an explicit location constraint on bucket creation
const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for an S3 object store
#[derive(Clone, Debug, Default)]
pub struct S3Config {
    /// AWS region
    pub region: String,
    /// Custom endpoint (LocalStack, MinIO)
    pub endpoint_url: Option<String>,
    /// Use path-style addressing, required by most S3-compatible services
    pub force_path_style: bool,
    /// Static access key, otherwise the ambient credential chain is used
    pub access_key_id: Option<String>,
    /// Static secret key
    pub secret_access_key: Option<String>,
}

impl S3Config {
    /// Create a config for a region using ambient credentials
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Default::default()
        }
    }

    /// Point the store at a custom endpoint with path-style addressing
    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self.force_path_style = true;
        self
    }

    /// Use static credentials
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }
}

/// Object store backed by the AWS SDK
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from the given configuration
    pub async fn new(config: S3Config) -> Result<Self> {
        if config.region.is_empty() {
            return Err(ObjectStoreError::Configuration(
                "s3 region must not be empty".to_string(),
            ));
        }
        if config.access_key_id.is_some() != config.secret_access_key.is_some() {
            return Err(ObjectStoreError::Configuration(
                "access_key_id and secret_access_key must be set together".to_string(),
            ));
        }

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (config.access_key_id, config.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "canopy-config",
            ));
        }

        info!(region = %config.region, endpoint = ?config.endpoint_url, "S3 object store configured");

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn is_status<E>(err: &SdkError<E>, status: u16) -> bool {
    err.raw_response()
        .map(|raw| raw.status().as_u16() == status)
        .unwrap_or(false)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, body), fields(backend = "s3", size = body.len()))]
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| ObjectStoreError::backend(aws_sdk_s3::error::DisplayErrorContext(e)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_status(&e, 404) {
                    ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    ObjectStoreError::backend(aws_sdk_s3::error::DisplayErrorContext(e))
                }
            })?;

        let content_length = output.content_length().unwrap_or(0).max(0) as u64;

        Ok(GetObjectOutput {
            content_length,
            body: Box::pin(output.body.into_async_read()),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn ensure_bucket_exists(&self, bucket: &str, region: &str) -> Result<()> {
        if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
            debug!(bucket, "bucket already exists");
            return Ok(());
        }

        let mut request = self
            .client
            .create_bucket()
            .bucket(bucket)
            .acl(BucketCannedAcl::Private);

        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket, region, "bucket created");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                debug!(bucket, "bucket created concurrently");
                Ok(())
            }
            Err(err) => Err(ObjectStoreError::BucketCreation {
                bucket: bucket.to_string(),
                reason: aws_sdk_s3::error::DisplayErrorContext(err).to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_with_endpoint_enables_path_style() {
        let config = S3Config::new("eu-west-1").with_endpoint("http://localhost:4566");

        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));
        assert!(config.force_path_style);
    }

    #[tokio::test]
    async fn test_rejects_partial_credentials() {
        let mut config = S3Config::new("eu-west-1");
        config.access_key_id = Some("key".to_string());

        let result = S3ObjectStore::new(config).await;
        assert!(matches!(result, Err(ObjectStoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_rejects_empty_region() {
        let result = S3ObjectStore::new(S3Config::default()).await;
        assert!(matches!(result, Err(ObjectStoreError::Configuration(_))));
    }
}
