//! Module family operations

use super::{Gateway, Operation};
use canopy_core::messages::{
    BeginVersionRequest, BeginVersionResponse, ContainerDependenciesResponse,
    DownloadSourceZipRequest, EndVersionRequest, ModuleConfigurationRequest,
    ModuleDependenciesResponse, PublishTagRequest, RegisterContainerDependenciesRequest,
    RegisterModuleDependenciesRequest, RegisterModuleRequest, Response,
    RetrieveContainerDependenciesRequest, RetrieveModuleDependenciesRequest, SourceZipResponse,
    TransactionStatus, UploadSourceZipRequest,
};
use canopy_core::{
    Artifact, CallContext, MessageSink, MessageSource, RegistryError, Result, VersionLifecycle,
};
use tracing::warn;

const SETUP_UNREACHABLE: &str =
    "Internal server error, unable to connect to the module creation service";
const SETUP_FAILED: &str = "Failed to execute SetupModule";

/// Module operations of a [`Gateway`]
pub struct ModuleGateway<'g> {
    gateway: &'g Gateway,
}

impl<'g> ModuleGateway<'g> {
    pub(super) fn new(gateway: &'g Gateway) -> Self {
        Self { gateway }
    }

    pub async fn register(
        &self,
        ctx: &CallContext,
        request: RegisterModuleRequest,
    ) -> Result<Response> {
        let registrar = &self.gateway.backends().module_registrar;
        let resource = Some(request.name.clone());
        self.gateway
            .unary(ctx, Operation::RegisterModule, resource, registrar.register(request))
            .await
    }

    pub async fn publish_tag(&self, ctx: &CallContext, request: PublishTagRequest) -> Result<Response> {
        let registrar = &self.gateway.backends().module_registrar;
        let resource = Some(request.name.clone());
        self.gateway
            .unary(ctx, Operation::PublishTag, resource, registrar.publish_tag(request))
            .await
    }

    pub async fn begin_version(
        &self,
        ctx: &CallContext,
        request: BeginVersionRequest,
    ) -> Result<BeginVersionResponse> {
        let backend = self.gateway.backends().module_versions.as_ref();
        let resource = Some(request.module.to_string());
        self.gateway
            .unary(ctx, Operation::BeginModuleVersion, resource, async move {
                VersionLifecycle::new(backend, request.module).begin(ctx).await
            })
            .await
    }

    /// Publish or discard the version opened under `request.session_key`
    pub async fn end_version(&self, ctx: &CallContext, request: EndVersionRequest) -> Result<Response> {
        let backend = self.gateway.backends().module_versions.as_ref();
        let resource = Some(request.module.to_string());
        self.gateway
            .unary(ctx, Operation::EndModuleVersion, resource, async move {
                VersionLifecycle::resume(backend, request.module, request.session_key)
                    .end(ctx, request.action)
                    .await
            })
            .await
    }

    pub async fn register_module_dependencies(
        &self,
        ctx: &CallContext,
        request: RegisterModuleDependenciesRequest,
    ) -> Result<Response> {
        let dependencies = &self.gateway.backends().dependencies;
        let resource = Some(request.module.to_string());
        self.gateway
            .unary(
                ctx,
                Operation::RegisterModuleDependencies,
                resource,
                dependencies.register_module_dependencies(request),
            )
            .await
    }

    pub async fn register_container_dependencies(
        &self,
        ctx: &CallContext,
        request: RegisterContainerDependenciesRequest,
    ) -> Result<Response> {
        let dependencies = &self.gateway.backends().dependencies;
        let resource = Some(request.module.to_string());
        self.gateway
            .unary(
                ctx,
                Operation::RegisterContainerDependencies,
                resource,
                dependencies.register_container_dependencies(request),
            )
            .await
    }

    /// Published versions of a module, lowest first
    pub async fn list_versions(&self, ctx: &CallContext, module: &str) -> Result<Vec<String>> {
        let index = &self.gateway.backends().module_version_index;
        self.gateway
            .unary(
                ctx,
                Operation::ListModuleVersions,
                Some(module.to_string()),
                index.list_versions(module),
            )
            .await
    }

    /// Legacy configuration call.
    ///
    /// Never fails at the transport level: every failure, including an
    /// unreachable registrar, becomes an `UNKNOWN_ERROR` status.
    pub async fn configure(
        &self,
        ctx: &CallContext,
        request: ModuleConfigurationRequest,
    ) -> TransactionStatus {
        let registrar = &self.gateway.backends().module_registrar;
        let resource = Some(request.name.clone());
        let result = self
            .gateway
            .unary(ctx, Operation::Configure, resource, registrar.setup_module(request.into()))
            .await;

        match result {
            Ok(status) => status,
            Err(RegistryError::BackendUnavailable { service }) => {
                warn!(service, "module creation service unreachable");
                TransactionStatus::error(SETUP_UNREACHABLE)
            }
            Err(err) => {
                warn!(error = %err, "module setup failed");
                TransactionStatus::error(SETUP_FAILED)
            }
        }
    }

    /// Relay a client-streamed source archive to storage
    pub async fn upload_source_zip<C>(&self, ctx: &CallContext, client: &mut C) -> Result<Response>
    where
        C: MessageSource<UploadSourceZipRequest> + ?Sized,
    {
        let storage = &self.gateway.backends().module_storage;
        self.gateway
            .bridge(ctx, Operation::UploadSourceZip, None)
            .forward_client_stream::<UploadSourceZipRequest, Response, _, _, _>(
                client,
                storage.upload_source_zip(ctx),
                Response::new(Artifact::SourceZip.uploaded_message()),
            )
            .await
    }

    pub async fn download_source_zip<K>(
        &self,
        ctx: &CallContext,
        request: DownloadSourceZipRequest,
        client: &mut K,
    ) -> Result<()>
    where
        K: MessageSink<SourceZipResponse> + ?Sized,
    {
        let storage = &self.gateway.backends().module_storage;
        let resource = Some(request.module.to_string());
        self.gateway
            .bridge(ctx, Operation::DownloadSourceZip, resource)
            .forward_server_stream::<SourceZipResponse, _, _, _>(
                storage.download_source_zip(ctx, request),
                client,
            )
            .await
    }

    pub async fn retrieve_module_dependencies<K>(
        &self,
        ctx: &CallContext,
        request: RetrieveModuleDependenciesRequest,
        client: &mut K,
    ) -> Result<()>
    where
        K: MessageSink<ModuleDependenciesResponse> + ?Sized,
    {
        let dependencies = &self.gateway.backends().dependencies;
        let resource = Some(request.module.to_string());
        self.gateway
            .bridge(ctx, Operation::RetrieveModuleDependencies, resource)
            .forward_server_stream::<ModuleDependenciesResponse, _, _, _>(
                dependencies.retrieve_module_dependencies(ctx, request),
                client,
            )
            .await
    }

    pub async fn retrieve_container_dependencies<K>(
        &self,
        ctx: &CallContext,
        request: RetrieveContainerDependenciesRequest,
        client: &mut K,
    ) -> Result<()>
    where
        K: MessageSink<ContainerDependenciesResponse> + ?Sized,
    {
        let dependencies = &self.gateway.backends().dependencies;
        let resource = Some(request.module.to_string());
        self.gateway
            .bridge(ctx, Operation::RetrieveContainerDependencies, resource)
            .forward_server_stream::<ContainerDependenciesResponse, _, _, _>(
                dependencies.retrieve_container_dependencies(ctx, request),
                client,
            )
            .await
    }
}
