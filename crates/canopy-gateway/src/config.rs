//! Gateway configuration

use canopy_objectstore::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

/// Backend service addresses.
///
/// The all-in-one gateway serves every backend in-process and reports these
/// addresses at startup. They describe where each backend lives in a split
/// deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendEndpoints {
    pub registrar: String,
    pub version_manager: String,
    pub provider_version_manager: String,
    pub dependency_manager: String,
    pub storage: String,
    pub release: String,
}

impl Default for BackendEndpoints {
    fn default() -> Self {
        Self {
            registrar: "registrar:3001".to_string(),
            version_manager: "version_manager:3001".to_string(),
            provider_version_manager: "provider_version_manager:3001".to_string(),
            dependency_manager: "dependency_manager:3001".to_string(),
            storage: "storage:3001".to_string(),
            release: "release:3001".to_string(),
        }
    }
}

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Bucket holding every stored artifact
    pub bucket: String,
    /// Region of the bucket
    pub region: String,
    /// Size of the chunks streamed to clients (bytes)
    pub chunk_size: usize,
    /// S3-compatible endpoint override (MinIO, LocalStack)
    pub s3_endpoint: Option<String>,
    /// Static S3 access key, paired with `s3_secret_access_key`
    pub s3_access_key_id: Option<String>,
    /// Static S3 secret key
    pub s3_secret_access_key: Option<String>,
    /// Use in-memory storage (for testing/development)
    pub use_memory_store: bool,
    /// Mount path of the REST module registry protocol
    pub mount_path: String,
    /// Mount path of the REST provider registry protocol
    pub provider_mount_path: String,
    /// Backend service addresses
    pub endpoints: BackendEndpoints,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            bucket: "terrarium-modules".to_string(),
            region: "eu-west-1".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            s3_endpoint: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            use_memory_store: false,
            mount_path: "/modules".to_string(),
            provider_mount_path: "/providers".to_string(),
            endpoints: BackendEndpoints::default(),
        }
    }
}

impl GatewayConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Module mount path with a leading slash and no trailing slash, `""`
    /// for the root
    pub fn normalized_mount_path(&self) -> String {
        normalize_mount(&self.mount_path)
    }

    pub fn normalized_provider_mount_path(&self) -> String {
        normalize_mount(&self.provider_mount_path)
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket.trim().is_empty() {
            anyhow::bail!("bucket name must not be empty");
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE,
                self.chunk_size
            );
        }
        if self.s3_access_key_id.is_some() != self.s3_secret_access_key.is_some() {
            anyhow::bail!("S3 access key id and secret access key must be set together");
        }
        let modules = self.normalized_mount_path();
        let providers = self.normalized_provider_mount_path();
        if modules == providers {
            anyhow::bail!("module and provider mount paths must differ, both are '{}'", modules);
        }
        if [&modules, &providers].iter().any(|mount| mount.as_str() == API_PREFIX) {
            anyhow::bail!("mount path {} is reserved for the publishing API", API_PREFIX);
        }
        Ok(())
    }
}

/// Prefix of the publishing API
pub const API_PREFIX: &str = "/api";

fn normalize_mount(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
