//! In-memory version manager

use crate::backends::ModuleVersionIndex;
use async_trait::async_trait;
use canopy_core::messages::{
    BeginVersionRequest, BeginVersionResponse, Response, TerminateVersionRequest, VersionedName,
};
use canopy_core::{RegistryError, Result, VersionBackend};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use std::collections::BTreeSet;
use tonic::Status;
use tracing::{debug, info};
use uuid::Uuid;

/// An open publish transaction
#[derive(Clone, Debug)]
pub struct VersionSession {
    pub subject: VersionedName,
    pub started_at: DateTime<Utc>,
}

/// Version manager keeping sessions and published versions in memory
#[derive(Debug, Default)]
pub struct MemoryVersionManager {
    sessions: DashMap<String, VersionSession>,
    published: DashMap<String, BTreeSet<Version>>,
}

impl MemoryVersionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open sessions
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, session_key: &str) -> Option<VersionSession> {
        self.sessions.get(session_key).map(|s| s.clone())
    }

    /// Published versions of `name`, lowest first
    pub fn published_versions(&self, name: &str) -> Vec<Version> {
        self.published
            .get(name)
            .map(|versions| versions.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_published(&self, subject: &VersionedName) -> bool {
        match Version::parse(&subject.version) {
            Ok(version) => self
                .published
                .get(&subject.name)
                .is_some_and(|versions| versions.contains(&version)),
            Err(_) => false,
        }
    }

    /// Remove the session `request` refers to, checking it belongs to the
    /// same version
    fn close_session(&self, request: &TerminateVersionRequest) -> Result<VersionSession> {
        let removed = self
            .sessions
            .remove_if(&request.session_key, |_, session| session.subject == request.module);

        match removed {
            Some((_, session)) => Ok(session),
            None if self.sessions.contains_key(&request.session_key) => Err(Status::invalid_argument(
                format!("Session does not belong to {}.", request.module),
            )
            .into()),
            None => Err(Status::not_found("Session not found.").into()),
        }
    }
}

fn parse_version(subject: &VersionedName) -> Result<Version> {
    Version::parse(&subject.version).map_err(|e| {
        RegistryError::InvalidResource(format!("invalid version '{}': {}", subject.version, e))
    })
}

#[async_trait]
impl VersionBackend for MemoryVersionManager {
    async fn begin_version(&self, request: BeginVersionRequest) -> Result<BeginVersionResponse> {
        let subject = request.module;
        if subject.name.is_empty() {
            return Err(RegistryError::InvalidResource("empty name".to_string()));
        }
        parse_version(&subject)?;
        if self.is_published(&subject) {
            return Err(Status::already_exists(format!("Version {} already published.", subject)).into());
        }

        let session_key = Uuid::new_v4().to_string();
        debug!(subject = %subject, session = %session_key, "session opened");
        self.sessions.insert(
            session_key.clone(),
            VersionSession {
                subject,
                started_at: Utc::now(),
            },
        );
        Ok(BeginVersionResponse { session_key })
    }

    async fn abort_version(&self, request: TerminateVersionRequest) -> Result<Response> {
        let session = self.close_session(&request)?;
        info!(subject = %session.subject, "version aborted");
        Ok(Response::new("Version aborted."))
    }

    async fn publish_version(&self, request: TerminateVersionRequest) -> Result<Response> {
        let version = parse_version(&request.module)?;
        let session = self.close_session(&request)?;

        self.published
            .entry(session.subject.name.clone())
            .or_default()
            .insert(version);
        info!(
            subject = %session.subject,
            open_for_ms = (Utc::now() - session.started_at).num_milliseconds(),
            "version published"
        );
        Ok(Response::new("Version published."))
    }
}

#[async_trait]
impl ModuleVersionIndex for MemoryVersionManager {
    async fn list_versions(&self, module: &str) -> Result<Vec<String>> {
        Ok(self
            .published_versions(module)
            .iter()
            .map(Version::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn subject(version: &str) -> VersionedName {
        VersionedName::new("cie/vpc/aws", version)
    }

    async fn begin(manager: &MemoryVersionManager, version: &str) -> String {
        manager
            .begin_version(BeginVersionRequest {
                module: subject(version),
            })
            .await
            .unwrap()
            .session_key
    }

    fn terminate(session_key: &str, version: &str) -> TerminateVersionRequest {
        TerminateVersionRequest {
            session_key: session_key.to_string(),
            module: subject(version),
        }
    }

    #[tokio::test]
    async fn test_publish_lists_version() {
        let manager = MemoryVersionManager::new();
        let session = begin(&manager, "1.0.0").await;
        assert!(Uuid::parse_str(&session).is_ok());

        let reply = manager.publish_version(terminate(&session, "1.0.0")).await.unwrap();

        assert_eq!(reply.message, "Version published.");
        assert_eq!(manager.open_sessions(), 0);
        assert_eq!(manager.list_versions("cie/vpc/aws").await.unwrap(), vec!["1.0.0"]);
    }

    #[tokio::test]
    async fn test_versions_sorted_semantically() {
        let manager = MemoryVersionManager::new();
        for version in ["1.10.0", "1.2.0", "0.9.1"] {
            let session = begin(&manager, version).await;
            manager.publish_version(terminate(&session, version)).await.unwrap();
        }

        assert_eq!(
            manager.list_versions("cie/vpc/aws").await.unwrap(),
            vec!["0.9.1", "1.2.0", "1.10.0"]
        );
        assert!(manager.list_versions("cie/other/aws").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abort_discards_session() {
        let manager = MemoryVersionManager::new();
        let session = begin(&manager, "1.0.0").await;

        let reply = manager.abort_version(terminate(&session, "1.0.0")).await.unwrap();

        assert_eq!(reply.message, "Version aborted.");
        assert!(!manager.is_published(&subject("1.0.0")));
        let err = manager
            .publish_version(terminate(&session, "1.0.0"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_session_must_match_version() {
        let manager = MemoryVersionManager::new();
        let session = begin(&manager, "1.0.0").await;

        let err = manager
            .publish_version(terminate(&session, "2.0.0"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(manager.session(&session).is_some());
    }

    #[tokio::test]
    async fn test_republish_rejected() {
        let manager = MemoryVersionManager::new();
        let session = begin(&manager, "1.0.0").await;
        manager.publish_version(terminate(&session, "1.0.0")).await.unwrap();

        let err = manager
            .begin_version(BeginVersionRequest {
                module: subject("1.0.0"),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::AlreadyExists);
    }

    #[tokio::test]
    async fn test_invalid_version_rejected() {
        let manager = MemoryVersionManager::new();

        let err = manager
            .begin_version(BeginVersionRequest {
                module: subject("latest"),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidResource(_)));
        assert_eq!(manager.open_sessions(), 0);
    }
}
