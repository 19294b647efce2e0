//! In-memory release publisher

use crate::backends::ReleasePublisher;
use async_trait::async_trait;
use canopy_core::messages::{PublishRequest, Response};
use canopy_core::{RegistryError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

/// A published release announcement
#[derive(Clone, Debug)]
pub struct ReleaseRecord {
    pub id: Uuid,
    pub release: PublishRequest,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryReleasePublisher {
    releases: DashMap<Uuid, ReleaseRecord>,
}

impl MemoryReleasePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases of `organization`, newest first
    pub fn releases_of(&self, organization: &str) -> Vec<ReleaseRecord> {
        let mut records: Vec<_> = self
            .releases
            .iter()
            .filter(|r| r.release.organization == organization)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }
}

#[async_trait]
impl ReleasePublisher for MemoryReleasePublisher {
    async fn publish(&self, request: PublishRequest) -> Result<Response> {
        for (field, value) in [
            ("organization", &request.organization),
            ("name", &request.name),
            ("version", &request.version),
        ] {
            if value.trim().is_empty() {
                return Err(RegistryError::InvalidResource(format!("missing release {}", field)));
            }
        }

        let id = Uuid::new_v4();
        info!(%id, organization = %request.organization, name = %request.name, version = %request.version, "release published");
        self.releases.insert(
            id,
            ReleaseRecord {
                id,
                release: request,
                created_at: Utc::now(),
            },
        );
        Ok(Response::new("Release published."))
    }
}
