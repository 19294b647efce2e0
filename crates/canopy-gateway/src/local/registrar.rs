//! In-memory module and provider registrars

use crate::backends::{ModuleRegistrar, ProviderRegistrar};
use async_trait::async_trait;
use canopy_core::messages::{
    Maturity, PlatformItem, PublishTagRequest, RegisterModuleRequest, RegisterProviderRequest,
    Response, SetupModuleRequest, TransactionStatus,
};
use canopy_core::{RegistryError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use std::collections::BTreeMap;
use tonic::Status;
use tracing::info;

/// Registered module or provider
#[derive(Clone, Debug)]
pub struct Registration {
    pub description: String,
    pub source_url: String,
    pub maturity: Maturity,
    pub tags: Vec<String>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    fn new(description: String, source_url: String, maturity: Maturity) -> Self {
        let now = Utc::now();
        Self {
            description,
            source_url,
            maturity,
            tags: Vec::new(),
            registered_at: now,
            updated_at: now,
        }
    }
}

/// Protocols and packages registered for one provider version
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderRelease {
    pub protocols: Vec<String>,
    pub platforms: Vec<PlatformItem>,
}

/// Registrar keeping registrations in memory, keyed by name
#[derive(Debug, Default)]
pub struct MemoryRegistrar {
    entries: DashMap<String, Registration>,
    provider_releases: DashMap<String, BTreeMap<Version, ProviderRelease>>,
}

impl MemoryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Registration> {
        self.entries.get(name).map(|r| r.clone())
    }

    pub fn provider_release(&self, name: &str, version: &Version) -> Option<ProviderRelease> {
        self.provider_releases
            .get(name)
            .and_then(|releases| releases.get(version).cloned())
    }

    /// Insert or update a registration, keeping tags and the first
    /// registration time
    fn upsert(&self, name: &str, description: String, source_url: String, maturity: Maturity) -> Result<()> {
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidResource("empty name".to_string()));
        }

        self.entries
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.description = description.clone();
                existing.source_url = source_url.clone();
                existing.maturity = maturity;
                existing.updated_at = Utc::now();
            })
            .or_insert_with(|| Registration::new(description, source_url, maturity));
        Ok(())
    }
}

#[async_trait]
impl ModuleRegistrar for MemoryRegistrar {
    async fn register(&self, request: RegisterModuleRequest) -> Result<Response> {
        self.upsert(&request.name, request.description, request.source_url, request.maturity)?;
        info!(module = %request.name, "module registered");
        Ok(Response::new("Module registered successfully."))
    }

    async fn publish_tag(&self, request: PublishTagRequest) -> Result<Response> {
        let mut entry = self
            .entries
            .get_mut(&request.name)
            .ok_or_else(|| Status::not_found(format!("Module {} not found.", request.name)))?;

        for tag in request.tags {
            if !entry.tags.contains(&tag) {
                entry.tags.push(tag);
            }
        }
        entry.updated_at = Utc::now();
        Ok(Response::new("Tag published."))
    }

    async fn setup_module(&self, request: SetupModuleRequest) -> Result<TransactionStatus> {
        self.upsert(&request.name, request.description, request.source_url, request.maturity)?;
        info!(module = %request.name, "module set up");
        Ok(TransactionStatus::ok("Module setup successfully."))
    }
}

#[async_trait]
impl ProviderRegistrar for MemoryRegistrar {
    async fn register(&self, request: RegisterProviderRequest) -> Result<Response> {
        let version = match request.version.as_str() {
            "" => None,
            raw => Some(Version::parse(raw).map_err(|e| {
                RegistryError::InvalidResource(format!("invalid version '{}': {}", raw, e))
            })?),
        };
        if let Some(platform) = request
            .platforms
            .iter()
            .find(|p| p.os.is_empty() || p.arch.is_empty())
        {
            return Err(RegistryError::InvalidResource(format!(
                "platform '{}_{}' needs both os and arch",
                platform.os, platform.arch
            )));
        }

        self.upsert(
            &request.name,
            request.description,
            request.source_url,
            Maturity::default(),
        )?;
        if let Some(version) = version {
            info!(
                provider = %request.name,
                %version,
                platforms = request.platforms.len(),
                "provider release registered"
            );
            self.provider_releases
                .entry(request.name.clone())
                .or_default()
                .insert(
                    version,
                    ProviderRelease {
                        protocols: request.protocols,
                        platforms: request.platforms,
                    },
                );
        } else {
            info!(provider = %request.name, "provider registered");
        }
        Ok(Response::new("Provider registered successfully."))
    }
}
