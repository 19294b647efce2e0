//! Resource identities and object key derivation
//!
//! Every stored artifact is addressed by a [`ResourceKey`]. Construction
//! validates the name, version and platform so that derived object keys are
//! stable and never collide across namespaces sharing one bucket:
//!
//! - module archives end in `{semver}.zip` directly under a three-segment prefix
//! - provider files always start with `terraform-provider-` under a version directory

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of object a resource key points at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    /// Module source archive
    ModuleArchive,
    /// Provider binary for one platform
    ProviderBinary,
    /// Provider SHA256SUMS file
    ProviderShasum,
    /// Detached signature of the SHA256SUMS file
    ProviderShasumSignature,
}

impl Namespace {
    /// Number of `/`-separated segments a resource name must have
    fn name_segments(self) -> usize {
        match self {
            Namespace::ModuleArchive => 3,
            _ => 2,
        }
    }
}

/// Target platform of a provider binary
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

/// Validated identity of a stored object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    namespace: Namespace,
    segments: Vec<String>,
    version: semver::Version,
    platform: Option<Platform>,
}

impl ResourceKey {
    /// Create and validate a resource key
    pub fn new(
        namespace: Namespace,
        name: &str,
        version: &str,
        platform: Option<Platform>,
    ) -> Result<Self> {
        let segments: Vec<String> = name.split('/').map(str::to_string).collect();
        if segments.len() != namespace.name_segments() {
            return Err(RegistryError::InvalidResource(format!(
                "name '{}' must have {} segments",
                name,
                namespace.name_segments()
            )));
        }
        for segment in &segments {
            validate_segment(segment)?;
        }

        let version = semver::Version::parse(version).map_err(|e| {
            RegistryError::InvalidResource(format!("invalid version '{}': {}", version, e))
        })?;

        match (namespace, &platform) {
            (Namespace::ProviderBinary, Some(p)) => {
                validate_platform_part("os", &p.os)?;
                validate_platform_part("arch", &p.arch)?;
            }
            (Namespace::ProviderBinary, None) => {
                return Err(RegistryError::InvalidResource(
                    "provider binaries require a platform".to_string(),
                ));
            }
            (_, Some(_)) => {
                return Err(RegistryError::InvalidResource(format!(
                    "{:?} does not take a platform",
                    namespace
                )));
            }
            (_, None) => {}
        }

        Ok(Self {
            namespace,
            segments,
            version,
            platform,
        })
    }

    /// Key of a module source archive, `name` is `org/name/provider`
    pub fn module_archive(name: &str, version: &str) -> Result<Self> {
        Self::new(Namespace::ModuleArchive, name, version, None)
    }

    /// Key of a provider binary, `name` is `org/type`
    pub fn provider_binary(name: &str, version: &str, os: &str, arch: &str) -> Result<Self> {
        Self::new(
            Namespace::ProviderBinary,
            name,
            version,
            Some(Platform::new(os, arch)),
        )
    }

    /// Key of a provider SHA256SUMS file
    pub fn provider_shasum(name: &str, version: &str) -> Result<Self> {
        Self::new(Namespace::ProviderShasum, name, version, None)
    }

    /// Key of a provider SHA256SUMS signature
    pub fn provider_shasum_signature(name: &str, version: &str) -> Result<Self> {
        Self::new(Namespace::ProviderShasumSignature, name, version, None)
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Full resource name as given at construction
    pub fn name(&self) -> String {
        self.segments.join("/")
    }

    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    pub fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }

    /// Derive the object-store key
    pub fn object_key(&self) -> String {
        let name = self.name();
        let version = &self.version;
        match self.namespace {
            Namespace::ModuleArchive => format!("{}/{}.zip", name, version),
            Namespace::ProviderBinary => {
                // Checked in `new`
                let (os, arch) = self
                    .platform
                    .as_ref()
                    .map(|p| (p.os.as_str(), p.arch.as_str()))
                    .unwrap_or_default();
                format!(
                    "{}/{}/{}_{}_{}.zip",
                    name,
                    version,
                    self.provider_file_stem(),
                    os,
                    arch
                )
            }
            Namespace::ProviderShasum => {
                format!("{}/{}/{}_SHA256SUMS", name, version, self.provider_file_stem())
            }
            Namespace::ProviderShasumSignature => {
                format!("{}/{}/{}_SHA256SUMS.sig", name, version, self.provider_file_stem())
            }
        }
    }

    fn provider_file_stem(&self) -> String {
        let provider_type = self.segments.last().map(String::as_str).unwrap_or_default();
        format!("terraform-provider-{}_{}", provider_type, self.version)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.object_key())
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment.contains("..")
        || segment.contains('\\')
        || segment.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(RegistryError::InvalidResource(format!(
            "invalid name segment '{}'",
            segment
        )));
    }
    Ok(())
}

fn validate_platform_part(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(RegistryError::InvalidResource(format!(
            "invalid {} '{}'",
            field, value
        )));
    }
    Ok(())
}

/// Artifact carried by a streaming call, used in replies and error messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Artifact {
    SourceZip,
    BinaryZip,
    Shasum,
    ShasumSignature,
    ModuleDependencies,
    ContainerDependencies,
}

impl Artifact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Artifact::SourceZip => "source zip",
            Artifact::BinaryZip => "binary zip",
            Artifact::Shasum => "shasum file",
            Artifact::ShasumSignature => "shasum signature file",
            Artifact::ModuleDependencies => "module dependencies",
            Artifact::ContainerDependencies => "container dependencies",
        }
    }

    /// Canned reply closing a successful upload
    pub fn uploaded_message(&self) -> &'static str {
        match self {
            Artifact::SourceZip => "Source zip uploaded successfully.",
            Artifact::BinaryZip => "Binary zip uploaded successfully.",
            Artifact::Shasum => "Shasum file uploaded successfully.",
            Artifact::ShasumSignature => "Shasum signature uploaded successfully.",
            Artifact::ModuleDependencies => "Module dependencies registered successfully.",
            Artifact::ContainerDependencies => "Container dependencies registered successfully.",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
