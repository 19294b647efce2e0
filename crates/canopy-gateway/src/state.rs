//! Application state

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::local;
use canopy_core::{StorageConfig, StorageService};
use canopy_objectstore::{MemoryObjectStore, ObjectStore, S3Config, S3ObjectStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Object store selected by the configuration
pub type SharedStore = Arc<dyn ObjectStore>;

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Router for every registry operation
    pub gateway: Gateway,
}

impl AppState {
    /// Create the all-in-one state: object store, storage service with its
    /// bucket, and in-process backends
    pub async fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Self::create_store(&config).await?;
        let storage_config = StorageConfig::new(&config.bucket, &config.region)
            .with_chunk_size(config.chunk_size);
        let storage = StorageService::new(store, storage_config)?;
        storage.initialize().await?;

        let endpoints = &config.endpoints;
        info!(
            registrar = %endpoints.registrar,
            version_manager = %endpoints.version_manager,
            provider_version_manager = %endpoints.provider_version_manager,
            dependency_manager = %endpoints.dependency_manager,
            storage = %endpoints.storage,
            release = %endpoints.release,
            "serving all backends in-process"
        );

        let gateway = Gateway::new(local::all_in_one(Arc::new(storage)));
        Ok(Self { config, gateway })
    }

    /// State around an already assembled gateway
    pub fn with_gateway(config: GatewayConfig, gateway: Gateway) -> Self {
        Self { config, gateway }
    }

    async fn create_store(config: &GatewayConfig) -> anyhow::Result<SharedStore> {
        if config.use_memory_store {
            warn!("Using in-memory object store (data will not persist)");
            return Ok(Arc::new(MemoryObjectStore::new()));
        }

        let mut s3 = S3Config::new(&config.region);
        if let Some(endpoint) = &config.s3_endpoint {
            s3 = s3.with_endpoint(endpoint);
        }
        if let (Some(key_id), Some(secret)) =
            (&config.s3_access_key_id, &config.s3_secret_access_key)
        {
            s3 = s3.with_credentials(key_id, secret);
        }

        let store = S3ObjectStore::new(s3).await?;
        info!(region = %config.region, endpoint = ?config.s3_endpoint, "Connected to S3 object store");
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_state() {
        let config = GatewayConfig {
            use_memory_store: true,
            ..Default::default()
        };

        let state = AppState::new(config).await.unwrap();

        assert!(state.config.use_memory_store);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = GatewayConfig {
            use_memory_store: true,
            chunk_size: 0,
            ..Default::default()
        };

        assert!(AppState::new(config).await.is_err());
    }
}
