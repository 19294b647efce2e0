//! Module versions, download and archive handlers
//!
//! Terraform resolves a module in three steps: it lists the versions, asks
//! where the chosen version can be downloaded from, and fetches the archive
//! at that location.

use super::{call_context, finish_download, streamed_response};
use crate::middleware::RequestId;
use crate::{ApiError, AppState};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use canopy_core::messages::{DownloadSourceZipRequest, SourceZipResponse, VersionedName};
use canopy_core::{message_channel, DEFAULT_CHANNEL_CAPACITY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Header telling Terraform where to fetch the archive from
pub const TERRAFORM_GET_HEADER: &str = "X-Terraform-Get";

/// Archive location relative to the download endpoint
pub const ARCHIVE_LOCATION: &str = "./archive?archive=zip";

const VERSIONS_UNAVAILABLE: &str = "failed to retrieve the list of versions from backend service";

/// Path of a module across its versions
#[derive(Debug, Deserialize)]
pub struct ModulePath {
    pub organization: String,
    pub name: String,
    pub provider: String,
}

impl ModulePath {
    /// Registry name, `organization/name/provider`
    pub fn module_name(&self) -> String {
        format!("{}/{}/{}", self.organization, self.name, self.provider)
    }
}

/// Path of one module version
#[derive(Debug, Deserialize)]
pub struct ModuleVersionPath {
    pub organization: String,
    pub name: String,
    pub provider: String,
    pub version: String,
}

impl ModuleVersionPath {
    pub fn module(&self) -> VersionedName {
        VersionedName::new(
            format!("{}/{}/{}", self.organization, self.name, self.provider),
            &self.version,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleVersionItem {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleVersions {
    pub versions: Vec<ModuleVersionItem>,
}

/// Body of the versions endpoint
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleVersionResponse {
    pub modules: Vec<ModuleVersions>,
}

/// GET {mount}/v1/{organization}/{name}/{provider}/versions
pub async fn list_module_versions(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ModulePath>,
) -> Result<Json<ModuleVersionResponse>, ApiError> {
    let module = path.module_name();
    let ctx = call_context(request_id);

    let versions = state
        .gateway
        .modules()
        .list_versions(&ctx, &module)
        .await
        .map_err(|err| {
            error!(%module, error = %err, "listing module versions failed");
            ApiError::Internal(VERSIONS_UNAVAILABLE.to_string())
        })?;

    if versions.is_empty() {
        return Err(ApiError::not_found(format!("module {} not found", module)));
    }

    Ok(Json(ModuleVersionResponse {
        modules: vec![ModuleVersions {
            versions: versions
                .into_iter()
                .map(|version| ModuleVersionItem { version })
                .collect(),
        }],
    }))
}

/// GET {mount}/v1/{organization}/{name}/{provider}/{version}/download
pub async fn download_module(Path(path): Path<ModuleVersionPath>) -> Response {
    debug!(module = %path.module(), "module download location requested");
    (
        StatusCode::NO_CONTENT,
        [(TERRAFORM_GET_HEADER, ARCHIVE_LOCATION)],
    )
        .into_response()
}

/// GET {mount}/v1/{organization}/{name}/{provider}/{version}/archive
///
/// Streams the stored source archive chunk by chunk.
pub async fn module_archive(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ModuleVersionPath>,
) -> Result<Response, ApiError> {
    let ctx = call_context(request_id);
    let request = DownloadSourceZipRequest {
        module: path.module(),
    };
    let (mut sink, source) = message_channel::<SourceZipResponse>(DEFAULT_CHANNEL_CAPACITY);

    let task_ctx = ctx.clone();
    tokio::spawn(async move {
        let result = state
            .gateway
            .modules()
            .download_source_zip(&task_ctx, request, &mut sink)
            .await;
        finish_download(&mut sink, result).await;
    });

    streamed_response(&ctx, source, "application/zip", |msg: SourceZipResponse| {
        msg.zip_data_chunk
    })
    .await
}
