//! Provider catalog: published provider versions joined with the releases
//! registered for them

use super::{MemoryRegistrar, MemoryVersionManager};
use crate::backends::ProviderVersionIndex;
use async_trait::async_trait;
use canopy_core::messages::{PlatformItem, ProviderPlatformRequest, ProviderVersionItem};
use canopy_core::{Platform, RegistryError, Result};
use semver::Version;
use std::sync::Arc;
use tonic::Status;

/// Provider read side over the in-memory registrar and version manager.
///
/// Only published versions are visible. A version published without a
/// registered release lists no protocols or platforms.
#[derive(Clone, Debug)]
pub struct ProviderCatalog {
    registrar: Arc<MemoryRegistrar>,
    versions: Arc<MemoryVersionManager>,
}

impl ProviderCatalog {
    pub fn new(registrar: Arc<MemoryRegistrar>, versions: Arc<MemoryVersionManager>) -> Self {
        Self {
            registrar,
            versions,
        }
    }
}

#[async_trait]
impl ProviderVersionIndex for ProviderCatalog {
    async fn list_provider_versions(&self, provider: &str) -> Result<Vec<ProviderVersionItem>> {
        Ok(self
            .versions
            .published_versions(provider)
            .into_iter()
            .map(|version| {
                let release = self
                    .registrar
                    .provider_release(provider, &version)
                    .unwrap_or_default();
                ProviderVersionItem {
                    version: version.to_string(),
                    protocols: release.protocols,
                    platforms: release
                        .platforms
                        .into_iter()
                        .map(|p| Platform::new(p.os, p.arch))
                        .collect(),
                }
            })
            .collect())
    }

    async fn platform(&self, request: ProviderPlatformRequest) -> Result<PlatformItem> {
        let version = Version::parse(&request.provider.version).map_err(|e| {
            RegistryError::InvalidResource(format!(
                "invalid version '{}': {}",
                request.provider.version, e
            ))
        })?;
        if !self.versions.is_published(&request.provider) {
            return Err(Status::not_found(format!(
                "Provider {} is not published.",
                request.provider
            ))
            .into());
        }

        self.registrar
            .provider_release(&request.provider.name, &version)
            .and_then(|release| {
                release
                    .platforms
                    .into_iter()
                    .find(|p| p.matches(&request.os, &request.arch))
            })
            .ok_or_else(|| {
                Status::not_found(format!(
                    "Provider {} has no package for {}_{}.",
                    request.provider, request.os, request.arch
                ))
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ProviderRegistrar;
    use canopy_core::messages::{
        BeginVersionRequest, RegisterProviderRequest, TerminateVersionRequest, VersionedName,
    };
    use canopy_core::VersionBackend;
    use tonic::Code;

    fn aws(version: &str) -> VersionedName {
        VersionedName::new("cie/aws", version)
    }

    fn linux() -> PlatformItem {
        PlatformItem {
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            shasum: "deadbeef".to_string(),
            ..Default::default()
        }
    }

    async fn catalog() -> (ProviderCatalog, Arc<MemoryVersionManager>) {
        let registrar = Arc::new(MemoryRegistrar::new());
        let versions = Arc::new(MemoryVersionManager::new());
        for version in ["5.1.0", "5.2.0"] {
            ProviderRegistrar::register(
                registrar.as_ref(),
                RegisterProviderRequest {
                    name: "cie/aws".to_string(),
                    version: version.to_string(),
                    protocols: vec!["5.0".to_string()],
                    platforms: vec![linux()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        (ProviderCatalog::new(registrar, versions.clone()), versions)
    }

    async fn publish(versions: &MemoryVersionManager, version: &str) {
        let session = versions
            .begin_version(BeginVersionRequest {
                module: aws(version),
            })
            .await
            .unwrap();
        versions
            .publish_version(TerminateVersionRequest {
                session_key: session.session_key,
                module: aws(version),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lists_published_versions_only() {
        let (catalog, versions) = catalog().await;
        publish(&versions, "5.1.0").await;

        let listed = catalog.list_provider_versions("cie/aws").await.unwrap();

        assert_eq!(
            listed,
            vec![ProviderVersionItem {
                version: "5.1.0".to_string(),
                protocols: vec!["5.0".to_string()],
                platforms: vec![Platform::new("linux", "amd64")],
            }]
        );
    }

    #[tokio::test]
    async fn test_platform_lookup() {
        let (catalog, versions) = catalog().await;
        publish(&versions, "5.1.0").await;
        let request = |version: &str, os: &str| ProviderPlatformRequest {
            provider: aws(version),
            os: os.to_string(),
            arch: "amd64".to_string(),
        };

        let found = catalog.platform(request("5.1.0", "linux")).await.unwrap();
        assert_eq!(found.shasum, "deadbeef");

        let err = catalog.platform(request("5.1.0", "windows")).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);

        // Registered but never published
        let err = catalog.platform(request("5.2.0", "linux")).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }
}
