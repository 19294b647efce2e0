//! Provider versions, package, archive and checksum handlers
//!
//! Terraform lists the versions of a provider, asks for the package of the
//! chosen version on its platform, then fetches the archive together with
//! the checksum file and its signature.

use super::{call_context, finish_download, streamed_response};
use crate::middleware::RequestId;
use crate::{ApiError, AppState};
use axum::{
    extract::{Extension, Path, State},
    response::Response,
    Json,
};
use canopy_core::messages::{
    DownloadProviderSourceZipRequest, DownloadShasumRequest, DownloadShasumResponse,
    DownloadShasumSignatureRequest, PlatformItem, ProviderPlatformRequest, ProviderVersionItem,
    SourceZipResponse, VersionedName,
};
use canopy_core::{message_channel, DEFAULT_CHANNEL_CAPACITY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tonic::Code;
use tracing::{debug, error};

const VERSIONS_UNAVAILABLE: &str = "failed to retrieve the list of versions from backend service";

/// Suffix of the detached signature of a checksum file
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// File name of the archive of one platform
pub fn archive_file_name(name: &str, version: &str, os: &str, arch: &str) -> String {
    format!("terraform-provider-{}_{}_{}_{}.zip", name, version, os, arch)
}

/// File name of the checksums of a release
pub fn shasums_file_name(name: &str, version: &str) -> String {
    format!("terraform-provider-{}_{}_SHA256SUMS", name, version)
}

/// Path of a provider across its versions
#[derive(Debug, Deserialize)]
pub struct ProviderPath {
    pub organization: String,
    pub name: String,
}

impl ProviderPath {
    /// Registry name, `organization/name`
    pub fn provider_name(&self) -> String {
        format!("{}/{}", self.organization, self.name)
    }
}

/// Path of one platform of a provider version
#[derive(Debug, Deserialize)]
pub struct PlatformPath {
    pub organization: String,
    pub name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl PlatformPath {
    pub fn provider(&self) -> VersionedName {
        VersionedName::new(format!("{}/{}", self.organization, self.name), &self.version)
    }

    pub fn archive_file_name(&self) -> String {
        archive_file_name(&self.name, &self.version, &self.os, &self.arch)
    }

    /// Point the package's empty file name and URLs at this registry,
    /// `mount` being the normalized provider mount path
    pub fn fill_locations(&self, mount: &str, package: &mut PlatformItem) {
        let release = format!(
            "{}/v1/{}/{}/{}",
            mount, self.organization, self.name, self.version
        );
        let shasums = format!(
            "{}/{}",
            release,
            shasums_file_name(&self.name, &self.version)
        );

        if package.filename.is_empty() {
            package.filename = self.archive_file_name();
        }
        if package.download_url.is_empty() {
            package.download_url = format!(
                "{}/{}/{}/{}",
                release, self.os, self.arch, package.filename
            );
        }
        if package.shasums_signature_url.is_empty() {
            package.shasums_signature_url = format!("{}{}", shasums, SIGNATURE_SUFFIX);
        }
        if package.shasums_url.is_empty() {
            package.shasums_url = shasums;
        }
    }
}

/// Path of a file served for one platform: `{organization}/{name}/{version}/{os}/{arch}/{file}`
#[derive(Debug, Deserialize)]
pub struct PlatformFilePath {
    pub organization: String,
    pub name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub file: String,
}

/// Body of the versions endpoint
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderVersionsResponse {
    pub versions: Vec<ProviderVersionItem>,
}

/// GET {mount}/v1/{organization}/{name}/versions
pub async fn list_provider_versions(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ProviderPath>,
) -> Result<Json<ProviderVersionsResponse>, ApiError> {
    let provider = path.provider_name();
    let ctx = call_context(request_id);

    let versions = state
        .gateway
        .providers()
        .list_versions(&ctx, &provider)
        .await
        .map_err(|err| {
            error!(%provider, error = %err, "listing provider versions failed");
            ApiError::Internal(VERSIONS_UNAVAILABLE.to_string())
        })?;

    if versions.is_empty() {
        return Err(ApiError::not_found(format!("provider {} not found", provider)));
    }

    Ok(Json(ProviderVersionsResponse { versions }))
}

/// GET {mount}/v1/{organization}/{name}/{version}/download/{os}/{arch}
pub async fn download_provider(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<PlatformPath>,
) -> Result<Json<PlatformItem>, ApiError> {
    let ctx = call_context(request_id);
    let request = ProviderPlatformRequest {
        provider: path.provider(),
        os: path.os.clone(),
        arch: path.arch.clone(),
    };

    let mut package = state
        .gateway
        .providers()
        .platform(&ctx, request)
        .await
        .map_err(|err| match err.code() {
            Code::NotFound | Code::InvalidArgument => ApiError::not_found(format!(
                "provider {} has no package for {}_{}",
                path.provider(),
                path.os,
                path.arch
            )),
            _ => ApiError::from(err),
        })?;

    path.fill_locations(&state.config.normalized_provider_mount_path(), &mut package);
    debug!(provider = %path.provider(), filename = %package.filename, "provider package resolved");
    Ok(Json(package))
}

/// GET {mount}/v1/{organization}/{name}/{version}/{os}/{arch}/terraform-provider-{name}_{version}_{os}_{arch}.zip
pub async fn provider_archive(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<PlatformFilePath>,
) -> Result<Response, ApiError> {
    let platform = PlatformPath {
        organization: path.organization,
        name: path.name,
        version: path.version,
        os: path.os,
        arch: path.arch,
    };
    if path.file != platform.archive_file_name() {
        return Err(ApiError::not_found(format!("unknown file {}", path.file)));
    }

    let ctx = call_context(request_id);
    let request = DownloadProviderSourceZipRequest {
        provider: platform.provider(),
        os: platform.os,
        arch: platform.arch,
    };
    let (mut sink, source) = message_channel::<SourceZipResponse>(DEFAULT_CHANNEL_CAPACITY);

    let task_ctx = ctx.clone();
    tokio::spawn(async move {
        let result = state
            .gateway
            .providers()
            .download_provider_source_zip(&task_ctx, request, &mut sink)
            .await;
        finish_download(&mut sink, result).await;
    });

    streamed_response(&ctx, source, "application/zip", |msg: SourceZipResponse| {
        msg.zip_data_chunk
    })
    .await
}

/// GET {mount}/v1/{organization}/{name}/{version}/terraform-provider-{name}_{version}_SHA256SUMS[.sig]
///
/// Extracted positionally: the last segment shares its route position with
/// the platform segment of the archive route.
pub async fn provider_release_file(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path((organization, name, version, file)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    let shasums = shasums_file_name(&name, &version);
    let signature = file
        .strip_prefix(shasums.as_str())
        .and_then(|rest| match rest {
            "" => Some(false),
            SIGNATURE_SUFFIX => Some(true),
            _ => None,
        })
        .ok_or_else(|| ApiError::not_found(format!("unknown file {}", file)))?;

    let ctx = call_context(request_id);
    let provider = VersionedName::new(format!("{}/{}", organization, name), &version);
    let (mut sink, source) =
        message_channel::<DownloadShasumResponse>(DEFAULT_CHANNEL_CAPACITY);

    let task_ctx = ctx.clone();
    tokio::spawn(async move {
        let providers = state.gateway.providers();
        let result = if signature {
            providers
                .download_shasum_signature(
                    &task_ctx,
                    DownloadShasumSignatureRequest { provider },
                    &mut sink,
                )
                .await
        } else {
            providers
                .download_shasum(&task_ctx, DownloadShasumRequest { provider }, &mut sink)
                .await
        };
        finish_download(&mut sink, result).await;
    });

    streamed_response(&ctx, source, "text/plain", |msg: DownloadShasumResponse| {
        msg.shasum_data_chunk
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> PlatformPath {
        PlatformPath {
            organization: "cie".to_string(),
            name: "aws".to_string(),
            version: "5.1.0".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            platform().archive_file_name(),
            "terraform-provider-aws_5.1.0_linux_amd64.zip"
        );
        assert_eq!(
            shasums_file_name("aws", "5.1.0"),
            "terraform-provider-aws_5.1.0_SHA256SUMS"
        );
    }

    #[test]
    fn test_empty_locations_point_at_registry() {
        let mut package = PlatformItem {
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            ..Default::default()
        };

        platform().fill_locations("/providers", &mut package);

        assert_eq!(package.filename, "terraform-provider-aws_5.1.0_linux_amd64.zip");
        assert_eq!(
            package.download_url,
            "/providers/v1/cie/aws/5.1.0/linux/amd64/terraform-provider-aws_5.1.0_linux_amd64.zip"
        );
        assert_eq!(
            package.shasums_url,
            "/providers/v1/cie/aws/5.1.0/terraform-provider-aws_5.1.0_SHA256SUMS"
        );
        assert_eq!(
            package.shasums_signature_url,
            "/providers/v1/cie/aws/5.1.0/terraform-provider-aws_5.1.0_SHA256SUMS.sig"
        );
    }

    #[test]
    fn test_registered_locations_are_kept() {
        let mut package = PlatformItem {
            filename: "aws.zip".to_string(),
            download_url: "https://releases.example.com/aws.zip".to_string(),
            ..Default::default()
        };

        platform().fill_locations("", &mut package);

        assert_eq!(package.download_url, "https://releases.example.com/aws.zip");
        assert_eq!(
            package.shasums_url,
            "/v1/cie/aws/5.1.0/terraform-provider-aws_5.1.0_SHA256SUMS"
        );
    }
}
