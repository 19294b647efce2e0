//! Request and response messages of the registry RPC surface
//!
//! Plain serde structs shaped like the wire messages. Chunk-carrying messages
//! implement [`ResourceRequest`], [`ChunkedUpload`] and [`ChunkedDownload`] so
//! one storage implementation serves every artifact.

use crate::error::{RegistryError, Result};
use crate::resource::{Artifact, Platform, ResourceKey};
use crate::storage::{ChunkedDownload, ChunkedUpload, ResourceRequest};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name and version of a module (`org/name/provider`) or provider (`org/type`)
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedName {
    pub name: String,
    pub version: String,
}

impl VersionedName {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Canned unary reply
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub message: String,
}

impl Response {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome carried by a [`TransactionStatus`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    #[default]
    Ok,
    UnknownError,
}

/// Structured reply of legacy transactional operations
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub status: StatusCode,
    pub message: String,
}

impl TransactionStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UnknownError,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }
}

/// Terminal action of a version transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum VersionAction {
    Discard = 0,
    Publish = 1,
}

impl VersionAction {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for VersionAction {
    type Error = RegistryError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(VersionAction::Discard),
            1 => Ok(VersionAction::Publish),
            other => Err(RegistryError::UnknownAction(other)),
        }
    }
}

impl fmt::Display for VersionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionAction::Discard => f.write_str("discard"),
            VersionAction::Publish => f.write_str("publish"),
        }
    }
}

// ============================================================================
// Registrar
// ============================================================================

/// Maturity advertised for a module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    #[default]
    Unknown,
    Alpha,
    Beta,
    Stable,
    Deprecated,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterModuleRequest {
    pub name: String,
    pub description: String,
    pub source_url: String,
    pub maturity: Maturity,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTagRequest {
    pub name: String,
    pub tags: Vec<String>,
}

/// Provider registration. `version`, `protocols` and `platforms` describe
/// one release of the provider and may be left empty to register the name
/// alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProviderRequest {
    pub name: String,
    pub description: String,
    pub source_url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<PlatformItem>,
}

/// GPG key the checksums of a provider release are signed with
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgPublicKey {
    pub key_id: String,
    pub ascii_armor: String,
    #[serde(default)]
    pub trust_signature: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeys {
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

/// Distribution package of a provider release for one platform
///
/// Empty file names and URLs are filled in with the registry's own
/// locations when the package is served.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformItem {
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    pub shasums_url: String,
    pub shasums_signature_url: String,
    pub shasum: String,
    pub signing_keys: SigningKeys,
}

impl PlatformItem {
    pub fn matches(&self, os: &str, arch: &str) -> bool {
        self.os == os && self.arch == arch
    }
}

/// Legacy module configuration, answered with a [`TransactionStatus`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfigurationRequest {
    pub name: String,
    pub description: String,
    pub source_url: String,
    pub maturity: Maturity,
}

/// Backend form of [`ModuleConfigurationRequest`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupModuleRequest {
    pub name: String,
    pub description: String,
    pub source_url: String,
    pub maturity: Maturity,
}

impl From<ModuleConfigurationRequest> for SetupModuleRequest {
    fn from(request: ModuleConfigurationRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            source_url: request.source_url,
            maturity: request.maturity,
        }
    }
}

// ============================================================================
// Version manager
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginVersionRequest {
    pub module: VersionedName,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginVersionResponse {
    pub session_key: String,
}

/// Public terminal call, `action` is the raw wire discriminator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndVersionRequest {
    pub session_key: String,
    pub module: VersionedName,
    pub action: i32,
}

/// Backend abort or publish call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateVersionRequest {
    pub session_key: String,
    pub module: VersionedName,
}

/// Published provider version as listed to consumers
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderVersionItem {
    pub version: String,
    pub protocols: Vec<String>,
    pub platforms: Vec<Platform>,
}

/// Package lookup for one platform of a published provider version
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPlatformRequest {
    pub provider: VersionedName,
    pub os: String,
    pub arch: String,
}

// ============================================================================
// Module storage
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSourceZipRequest {
    pub module: VersionedName,
    pub zip_data_chunk: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSourceZipRequest {
    pub module: VersionedName,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceZipResponse {
    pub zip_data_chunk: Bytes,
}

impl ResourceRequest for UploadSourceZipRequest {
    const ARTIFACT: Artifact = Artifact::SourceZip;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::module_archive(&self.module.name, &self.module.version)
    }
}

impl ChunkedUpload for UploadSourceZipRequest {
    fn into_chunk(self) -> Bytes {
        self.zip_data_chunk
    }
}

impl ResourceRequest for DownloadSourceZipRequest {
    const ARTIFACT: Artifact = Artifact::SourceZip;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::module_archive(&self.module.name, &self.module.version)
    }
}

impl ChunkedDownload for SourceZipResponse {
    fn from_chunk(chunk: Bytes) -> Self {
        Self {
            zip_data_chunk: chunk,
        }
    }

    fn chunk(&self) -> &[u8] {
        &self.zip_data_chunk
    }
}

// ============================================================================
// Provider storage
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProviderBinaryZipRequest {
    pub provider: VersionedName,
    pub os: String,
    pub arch: String,
    pub zip_data_chunk: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProviderSourceZipRequest {
    pub provider: VersionedName,
    pub os: String,
    pub arch: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadShasumRequest {
    pub provider: VersionedName,
    pub shasum_data_chunk: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadShasumSignatureRequest {
    pub provider: VersionedName,
    pub shasum_data_chunk: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadShasumRequest {
    pub provider: VersionedName,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadShasumSignatureRequest {
    pub provider: VersionedName,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadShasumResponse {
    pub shasum_data_chunk: Bytes,
}

impl ResourceRequest for UploadProviderBinaryZipRequest {
    const ARTIFACT: Artifact = Artifact::BinaryZip;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::provider_binary(
            &self.provider.name,
            &self.provider.version,
            &self.os,
            &self.arch,
        )
    }
}

impl ChunkedUpload for UploadProviderBinaryZipRequest {
    fn into_chunk(self) -> Bytes {
        self.zip_data_chunk
    }
}

impl ResourceRequest for DownloadProviderSourceZipRequest {
    const ARTIFACT: Artifact = Artifact::BinaryZip;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::provider_binary(
            &self.provider.name,
            &self.provider.version,
            &self.os,
            &self.arch,
        )
    }
}

impl ResourceRequest for UploadShasumRequest {
    const ARTIFACT: Artifact = Artifact::Shasum;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::provider_shasum(&self.provider.name, &self.provider.version)
    }
}

impl ChunkedUpload for UploadShasumRequest {
    fn into_chunk(self) -> Bytes {
        self.shasum_data_chunk
    }
}

impl ResourceRequest for UploadShasumSignatureRequest {
    const ARTIFACT: Artifact = Artifact::ShasumSignature;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::provider_shasum_signature(&self.provider.name, &self.provider.version)
    }
}

impl ChunkedUpload for UploadShasumSignatureRequest {
    fn into_chunk(self) -> Bytes {
        self.shasum_data_chunk
    }
}

impl ResourceRequest for DownloadShasumRequest {
    const ARTIFACT: Artifact = Artifact::Shasum;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::provider_shasum(&self.provider.name, &self.provider.version)
    }
}

impl ResourceRequest for DownloadShasumSignatureRequest {
    const ARTIFACT: Artifact = Artifact::ShasumSignature;

    fn resource_key(&self) -> Result<ResourceKey> {
        ResourceKey::provider_shasum_signature(&self.provider.name, &self.provider.version)
    }
}

impl ChunkedDownload for DownloadShasumResponse {
    fn from_chunk(chunk: Bytes) -> Self {
        Self {
            shasum_data_chunk: chunk,
        }
    }

    fn chunk(&self) -> &[u8] {
        &self.shasum_data_chunk
    }
}

// ============================================================================
// Dependencies
// ============================================================================

/// Container image referenced by a module
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerImage {
    pub name: String,
    pub reference: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterModuleDependenciesRequest {
    pub session_key: String,
    pub module: VersionedName,
    pub dependencies: Vec<VersionedName>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterContainerDependenciesRequest {
    pub session_key: String,
    pub module: VersionedName,
    pub images: Vec<ContainerImage>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveModuleDependenciesRequest {
    pub module: VersionedName,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDependenciesResponse {
    pub module: VersionedName,
    pub dependencies: Vec<VersionedName>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveContainerDependenciesRequest {
    pub module: VersionedName,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDependenciesResponse {
    pub module: VersionedName,
    pub images: Vec<ContainerImage>,
}

// ============================================================================
// Release
// ============================================================================

/// Kind of artifact a release announces
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    #[default]
    Module,
    Provider,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub release_type: ReleaseType,
    pub organization: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub links: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_action_from_wire() {
        assert_eq!(VersionAction::try_from(0).unwrap(), VersionAction::Discard);
        assert_eq!(VersionAction::try_from(1).unwrap(), VersionAction::Publish);
        assert!(matches!(
            VersionAction::try_from(2),
            Err(RegistryError::UnknownAction(2))
        ));
        assert_eq!(VersionAction::Publish.as_i32(), 1);
    }

    #[test]
    fn test_transaction_status_json() {
        let json = serde_json::to_value(TransactionStatus::error("Failed to execute SetupModule"))
            .unwrap();
        assert_eq!(json["status"], "UNKNOWN_ERROR");
    }

    #[test]
    fn test_upload_messages_address_resources() {
        let upload = UploadProviderBinaryZipRequest {
            provider: VersionedName::new("cie/aws", "5.1.0"),
            os: "darwin".to_string(),
            arch: "arm64".to_string(),
            zip_data_chunk: Bytes::from_static(b"PK"),
        };

        assert_eq!(
            upload.resource_key().unwrap().object_key(),
            "cie/aws/5.1.0/terraform-provider-aws_5.1.0_darwin_arm64.zip"
        );
        assert_eq!(upload.into_chunk().as_ref(), b"PK");
    }

    #[test]
    fn test_configuration_maps_to_setup() {
        let setup = SetupModuleRequest::from(ModuleConfigurationRequest {
            name: "cie/vpc/aws".to_string(),
            maturity: Maturity::Beta,
            ..Default::default()
        });
        assert_eq!(setup.name, "cie/vpc/aws");
        assert_eq!(setup.maturity, Maturity::Beta);
    }
}
