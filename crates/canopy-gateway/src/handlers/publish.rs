//! Publishing API
//!
//! JSON endpoints for every unary publish operation and streaming request
//! bodies for the artifact uploads, all routed through the [`Gateway`].
//! Errors keep the backend's status code, mapped to HTTP by [`ApiError`].
//!
//! [`Gateway`]: crate::Gateway

use super::{call_context, DownloadSource, ModuleVersionPath};
use crate::middleware::RequestId;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{Extension, Path, State},
    Json,
};
use bytes::Bytes;
use canopy_core::messages::{
    BeginVersionRequest, BeginVersionResponse, ContainerDependenciesResponse, EndVersionRequest,
    ModuleConfigurationRequest, ModuleDependenciesResponse, PublishRequest, PublishTagRequest,
    RegisterContainerDependenciesRequest, RegisterModuleDependenciesRequest,
    RegisterModuleRequest, RegisterProviderRequest, Response, RetrieveContainerDependenciesRequest,
    RetrieveModuleDependenciesRequest, TransactionStatus, UploadProviderBinaryZipRequest,
    UploadShasumRequest, UploadShasumSignatureRequest, UploadSourceZipRequest, VersionedName,
};
use canopy_core::{message_channel, MessageSource, StreamSource, DEFAULT_CHANNEL_CAPACITY};
use futures::stream::BoxStream;
use futures::{Future, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tonic::Status;

/// Client stream fed by an HTTP request body
type BodySource<T> = StreamSource<BoxStream<'static, Result<T, Status>>>;

/// Wrap every chunk of `body` into an upload message
fn body_source<T, F>(body: Body, message: F) -> BodySource<T>
where
    T: Send + 'static,
    F: Fn(Bytes) -> T + Send + 'static,
{
    let stream = body.into_data_stream().map(move |chunk| match chunk {
        Ok(data) => Ok(message(data)),
        Err(err) => Err(Status::unavailable(format!("request body failed: {}", err))),
    });
    StreamSource::new(stream.boxed())
}

/// Drive a server-streaming call while draining what it forwards
async fn collect<T, F>(forward: F, mut source: DownloadSource<T>) -> Result<Vec<T>, ApiError>
where
    T: Send,
    F: Future<Output = canopy_core::Result<()>>,
{
    let drain = async {
        let mut items = Vec::new();
        while let Ok(Some(item)) = source.recv().await {
            items.push(item);
        }
        items
    };

    let (result, items) = tokio::join!(forward, drain);
    result?;
    Ok(items)
}

/// Path of one provider version
#[derive(Debug, Deserialize)]
pub struct ProviderVersionPath {
    pub organization: String,
    pub name: String,
    pub version: String,
}

impl ProviderVersionPath {
    pub fn provider(&self) -> VersionedName {
        VersionedName::new(format!("{}/{}", self.organization, self.name), &self.version)
    }
}

/// Path of one platform binary of a provider version
#[derive(Debug, Deserialize)]
pub struct BinaryPath {
    pub organization: String,
    pub name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

// ============================================================================
// Modules
// ============================================================================

/// POST /api/v1/modules
pub async fn register_module(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RegisterModuleRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.modules().register(&ctx, request).await?))
}

/// POST /api/v1/modules/tags
pub async fn publish_tag(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<PublishTagRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.modules().publish_tag(&ctx, request).await?))
}

/// POST /api/v1/modules/configure
///
/// Legacy call: failures are reported in the body, never as an error status.
pub async fn configure_module(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ModuleConfigurationRequest>,
) -> Json<TransactionStatus> {
    let ctx = call_context(request_id);
    Json(state.gateway.modules().configure(&ctx, request).await)
}

/// POST /api/v1/modules/versions/begin
pub async fn begin_module_version(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<BeginVersionRequest>,
) -> Result<Json<BeginVersionResponse>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.modules().begin_version(&ctx, request).await?))
}

/// POST /api/v1/modules/versions/end
pub async fn end_module_version(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<EndVersionRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.modules().end_version(&ctx, request).await?))
}

/// POST /api/v1/modules/dependencies
pub async fn register_module_dependencies(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RegisterModuleDependenciesRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    let modules = state.gateway.modules();
    Ok(Json(modules.register_module_dependencies(&ctx, request).await?))
}

/// POST /api/v1/modules/container-dependencies
pub async fn register_container_dependencies(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RegisterContainerDependenciesRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    let modules = state.gateway.modules();
    Ok(Json(modules.register_container_dependencies(&ctx, request).await?))
}

/// GET /api/v1/modules/{organization}/{name}/{provider}/{version}/dependencies
pub async fn retrieve_module_dependencies(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ModuleVersionPath>,
) -> Result<Json<Vec<ModuleDependenciesResponse>>, ApiError> {
    let ctx = call_context(request_id);
    let modules = state.gateway.modules();
    let request = RetrieveModuleDependenciesRequest {
        module: path.module(),
    };
    let (mut sink, source) = message_channel(DEFAULT_CHANNEL_CAPACITY);

    let forward = {
        let ctx = &ctx;
        async move {
            let result = modules
                .retrieve_module_dependencies(ctx, request, &mut sink)
                .await;
            drop(sink);
            result
        }
    };
    Ok(Json(collect(forward, source).await?))
}

/// GET /api/v1/modules/{organization}/{name}/{provider}/{version}/container-dependencies
pub async fn retrieve_container_dependencies(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ModuleVersionPath>,
) -> Result<Json<Vec<ContainerDependenciesResponse>>, ApiError> {
    let ctx = call_context(request_id);
    let modules = state.gateway.modules();
    let request = RetrieveContainerDependenciesRequest {
        module: path.module(),
    };
    let (mut sink, source) = message_channel(DEFAULT_CHANNEL_CAPACITY);

    let forward = {
        let ctx = &ctx;
        async move {
            let result = modules
                .retrieve_container_dependencies(ctx, request, &mut sink)
                .await;
            drop(sink);
            result
        }
    };
    Ok(Json(collect(forward, source).await?))
}

/// PUT /api/v1/modules/{organization}/{name}/{provider}/{version}/source-zip
pub async fn upload_source_zip(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ModuleVersionPath>,
    body: Body,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    let module = path.module();
    let mut source = body_source(body, move |zip_data_chunk| UploadSourceZipRequest {
        module: module.clone(),
        zip_data_chunk,
    });

    let modules = state.gateway.modules();
    Ok(Json(modules.upload_source_zip(&ctx, &mut source).await?))
}

// ============================================================================
// Providers
// ============================================================================

/// POST /api/v1/providers
pub async fn register_provider(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RegisterProviderRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.providers().register(&ctx, request).await?))
}

/// POST /api/v1/providers/versions/begin
pub async fn begin_provider_version(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<BeginVersionRequest>,
) -> Result<Json<BeginVersionResponse>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.providers().begin_version(&ctx, request).await?))
}

/// POST /api/v1/providers/versions/end
pub async fn end_provider_version(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<EndVersionRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.providers().end_version(&ctx, request).await?))
}

/// PUT /api/v1/providers/{organization}/{name}/{version}/binary/{os}/{arch}
pub async fn upload_provider_binary_zip(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<BinaryPath>,
    body: Body,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    let provider = VersionedName::new(format!("{}/{}", path.organization, path.name), &path.version);
    let mut source = body_source(body, move |zip_data_chunk| UploadProviderBinaryZipRequest {
        provider: provider.clone(),
        os: path.os.clone(),
        arch: path.arch.clone(),
        zip_data_chunk,
    });

    let providers = state.gateway.providers();
    Ok(Json(providers.upload_provider_binary_zip(&ctx, &mut source).await?))
}

/// PUT /api/v1/providers/{organization}/{name}/{version}/shasum
pub async fn upload_shasum(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ProviderVersionPath>,
    body: Body,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    let provider = path.provider();
    let mut source = body_source(body, move |shasum_data_chunk| UploadShasumRequest {
        provider: provider.clone(),
        shasum_data_chunk,
    });

    let providers = state.gateway.providers();
    Ok(Json(providers.upload_shasum(&ctx, &mut source).await?))
}

/// PUT /api/v1/providers/{organization}/{name}/{version}/shasum-signature
pub async fn upload_shasum_signature(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(path): Path<ProviderVersionPath>,
    body: Body,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    let provider = path.provider();
    let mut source = body_source(body, move |shasum_data_chunk| UploadShasumSignatureRequest {
        provider: provider.clone(),
        shasum_data_chunk,
    });

    let providers = state.gateway.providers();
    Ok(Json(providers.upload_shasum_signature(&ctx, &mut source).await?))
}

// ============================================================================
// Releases
// ============================================================================

/// POST /api/v1/releases
pub async fn publish_release(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<Response>, ApiError> {
    let ctx = call_context(request_id);
    Ok(Json(state.gateway.releases().publish(&ctx, request).await?))
}
