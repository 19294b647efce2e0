//! Backend service clients
//!
//! The gateway never talks to a transport directly. Each backend service is a
//! trait; unary calls return their reply, streaming calls open a call object
//! the Stream Bridge drives. [`crate::local`] implements every trait
//! in-process, [`Unreachable`] stands in for a backend that cannot be dialled.

use crate::gateway::Backend;
use async_trait::async_trait;
use canopy_core::messages::{
    BeginVersionRequest, BeginVersionResponse, ContainerDependenciesResponse,
    DownloadProviderSourceZipRequest, DownloadShasumRequest, DownloadShasumResponse,
    DownloadShasumSignatureRequest, DownloadSourceZipRequest, ModuleDependenciesResponse,
    PlatformItem, ProviderPlatformRequest, ProviderVersionItem, PublishRequest, PublishTagRequest, RegisterContainerDependenciesRequest,
    RegisterModuleDependenciesRequest, RegisterModuleRequest, RegisterProviderRequest, Response,
    RetrieveContainerDependenciesRequest, RetrieveModuleDependenciesRequest, SetupModuleRequest,
    SourceZipResponse, TerminateVersionRequest, TransactionStatus, UploadProviderBinaryZipRequest,
    UploadShasumRequest, UploadShasumSignatureRequest, UploadSourceZipRequest,
};
use canopy_core::{CallContext, DownstreamCall, RegistryError, Result, UpstreamCall, VersionBackend};
use std::sync::Arc;

/// Open client-streaming call to a backend
pub type BoxUpstream<Req, Resp> = Box<dyn UpstreamCall<Req, Resp>>;

/// Open server-streaming call to a backend
pub type BoxDownstream<T> = Box<dyn DownstreamCall<T>>;

#[async_trait]
pub trait ModuleRegistrar: Send + Sync {
    async fn register(&self, request: RegisterModuleRequest) -> Result<Response>;

    async fn publish_tag(&self, request: PublishTagRequest) -> Result<Response>;

    /// Legacy module creation
    async fn setup_module(&self, request: SetupModuleRequest) -> Result<TransactionStatus>;
}

#[async_trait]
pub trait ProviderRegistrar: Send + Sync {
    async fn register(&self, request: RegisterProviderRequest) -> Result<Response>;
}

/// Read side of the module version manager
#[async_trait]
pub trait ModuleVersionIndex: Send + Sync {
    /// Published versions of `module`, lowest first
    async fn list_versions(&self, module: &str) -> Result<Vec<String>>;
}

/// Read side of the provider version manager
#[async_trait]
pub trait ProviderVersionIndex: Send + Sync {
    /// Published versions of `provider` with their protocols and platforms,
    /// lowest first
    async fn list_provider_versions(&self, provider: &str) -> Result<Vec<ProviderVersionItem>>;

    /// Package of a published version for one platform, `NotFound` if the
    /// version or the platform is unknown
    async fn platform(&self, request: ProviderPlatformRequest) -> Result<PlatformItem>;
}

#[async_trait]
pub trait DependencyManager: Send + Sync {
    async fn register_module_dependencies(
        &self,
        request: RegisterModuleDependenciesRequest,
    ) -> Result<Response>;

    async fn register_container_dependencies(
        &self,
        request: RegisterContainerDependenciesRequest,
    ) -> Result<Response>;

    async fn retrieve_module_dependencies(
        &self,
        ctx: &CallContext,
        request: RetrieveModuleDependenciesRequest,
    ) -> Result<BoxDownstream<ModuleDependenciesResponse>>;

    async fn retrieve_container_dependencies(
        &self,
        ctx: &CallContext,
        request: RetrieveContainerDependenciesRequest,
    ) -> Result<BoxDownstream<ContainerDependenciesResponse>>;
}

#[async_trait]
pub trait ModuleStorage: Send + Sync {
    async fn upload_source_zip(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadSourceZipRequest, Response>>;

    async fn download_source_zip(
        &self,
        ctx: &CallContext,
        request: DownloadSourceZipRequest,
    ) -> Result<BoxDownstream<SourceZipResponse>>;
}

#[async_trait]
pub trait ProviderStorage: Send + Sync {
    async fn upload_provider_binary_zip(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadProviderBinaryZipRequest, Response>>;

    async fn upload_shasum(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadShasumRequest, Response>>;

    async fn upload_shasum_signature(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadShasumSignatureRequest, Response>>;

    async fn download_provider_source_zip(
        &self,
        ctx: &CallContext,
        request: DownloadProviderSourceZipRequest,
    ) -> Result<BoxDownstream<SourceZipResponse>>;

    async fn download_shasum(
        &self,
        ctx: &CallContext,
        request: DownloadShasumRequest,
    ) -> Result<BoxDownstream<DownloadShasumResponse>>;

    async fn download_shasum_signature(
        &self,
        ctx: &CallContext,
        request: DownloadShasumSignatureRequest,
    ) -> Result<BoxDownstream<DownloadShasumResponse>>;
}

#[async_trait]
pub trait ReleasePublisher: Send + Sync {
    async fn publish(&self, request: PublishRequest) -> Result<Response>;
}

/// Every backend the gateway routes to
#[derive(Clone)]
pub struct Backends {
    pub module_registrar: Arc<dyn ModuleRegistrar>,
    pub provider_registrar: Arc<dyn ProviderRegistrar>,
    pub module_versions: Arc<dyn VersionBackend>,
    pub provider_versions: Arc<dyn VersionBackend>,
    pub module_version_index: Arc<dyn ModuleVersionIndex>,
    pub provider_version_index: Arc<dyn ProviderVersionIndex>,
    pub dependencies: Arc<dyn DependencyManager>,
    pub module_storage: Arc<dyn ModuleStorage>,
    pub provider_storage: Arc<dyn ProviderStorage>,
    pub releases: Arc<dyn ReleasePublisher>,
}

impl Backends {
    /// Backends that all fail with [`RegistryError::BackendUnavailable`]
    pub fn unreachable() -> Self {
        Self {
            module_registrar: Arc::new(Unreachable::for_backend(Backend::ModuleRegistrar)),
            provider_registrar: Arc::new(Unreachable::for_backend(Backend::ProviderRegistrar)),
            module_versions: Arc::new(Unreachable::for_backend(Backend::ModuleVersionManager)),
            provider_versions: Arc::new(Unreachable::for_backend(Backend::ProviderVersionManager)),
            module_version_index: Arc::new(Unreachable::for_backend(Backend::ModuleVersionManager)),
            provider_version_index: Arc::new(Unreachable::for_backend(
                Backend::ProviderVersionManager,
            )),
            dependencies: Arc::new(Unreachable::for_backend(Backend::DependencyManager)),
            module_storage: Arc::new(Unreachable::for_backend(Backend::ModuleStorage)),
            provider_storage: Arc::new(Unreachable::for_backend(Backend::ProviderStorage)),
            releases: Arc::new(Unreachable::for_backend(Backend::ReleasePublisher)),
        }
    }
}

/// A backend that could not be dialled
#[derive(Clone, Copy, Debug)]
pub struct Unreachable {
    service: &'static str,
}

impl Unreachable {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }

    pub fn for_backend(backend: Backend) -> Self {
        Self::new(backend.service_name())
    }

    fn fail<T>(&self) -> Result<T> {
        Err(RegistryError::BackendUnavailable {
            service: self.service,
        })
    }
}

#[async_trait]
impl ModuleRegistrar for Unreachable {
    async fn register(&self, _request: RegisterModuleRequest) -> Result<Response> {
        self.fail()
    }

    async fn publish_tag(&self, _request: PublishTagRequest) -> Result<Response> {
        self.fail()
    }

    async fn setup_module(&self, _request: SetupModuleRequest) -> Result<TransactionStatus> {
        self.fail()
    }
}

#[async_trait]
impl ProviderRegistrar for Unreachable {
    async fn register(&self, _request: RegisterProviderRequest) -> Result<Response> {
        self.fail()
    }
}

#[async_trait]
impl VersionBackend for Unreachable {
    async fn begin_version(&self, _request: BeginVersionRequest) -> Result<BeginVersionResponse> {
        self.fail()
    }

    async fn abort_version(&self, _request: TerminateVersionRequest) -> Result<Response> {
        self.fail()
    }

    async fn publish_version(&self, _request: TerminateVersionRequest) -> Result<Response> {
        self.fail()
    }
}

#[async_trait]
impl ModuleVersionIndex for Unreachable {
    async fn list_versions(&self, _module: &str) -> Result<Vec<String>> {
        self.fail()
    }
}

#[async_trait]
impl ProviderVersionIndex for Unreachable {
    async fn list_provider_versions(&self, _provider: &str) -> Result<Vec<ProviderVersionItem>> {
        self.fail()
    }

    async fn platform(&self, _request: ProviderPlatformRequest) -> Result<PlatformItem> {
        self.fail()
    }
}

#[async_trait]
impl DependencyManager for Unreachable {
    async fn register_module_dependencies(
        &self,
        _request: RegisterModuleDependenciesRequest,
    ) -> Result<Response> {
        self.fail()
    }

    async fn register_container_dependencies(
        &self,
        _request: RegisterContainerDependenciesRequest,
    ) -> Result<Response> {
        self.fail()
    }

    async fn retrieve_module_dependencies(
        &self,
        _ctx: &CallContext,
        _request: RetrieveModuleDependenciesRequest,
    ) -> Result<BoxDownstream<ModuleDependenciesResponse>> {
        self.fail()
    }

    async fn retrieve_container_dependencies(
        &self,
        _ctx: &CallContext,
        _request: RetrieveContainerDependenciesRequest,
    ) -> Result<BoxDownstream<ContainerDependenciesResponse>> {
        self.fail()
    }
}

#[async_trait]
impl ModuleStorage for Unreachable {
    async fn upload_source_zip(
        &self,
        _ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadSourceZipRequest, Response>> {
        self.fail()
    }

    async fn download_source_zip(
        &self,
        _ctx: &CallContext,
        _request: DownloadSourceZipRequest,
    ) -> Result<BoxDownstream<SourceZipResponse>> {
        self.fail()
    }
}

#[async_trait]
impl ProviderStorage for Unreachable {
    async fn upload_provider_binary_zip(
        &self,
        _ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadProviderBinaryZipRequest, Response>> {
        self.fail()
    }

    async fn upload_shasum(
        &self,
        _ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadShasumRequest, Response>> {
        self.fail()
    }

    async fn upload_shasum_signature(
        &self,
        _ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadShasumSignatureRequest, Response>> {
        self.fail()
    }

    async fn download_provider_source_zip(
        &self,
        _ctx: &CallContext,
        _request: DownloadProviderSourceZipRequest,
    ) -> Result<BoxDownstream<SourceZipResponse>> {
        self.fail()
    }

    async fn download_shasum(
        &self,
        _ctx: &CallContext,
        _request: DownloadShasumRequest,
    ) -> Result<BoxDownstream<DownloadShasumResponse>> {
        self.fail()
    }

    async fn download_shasum_signature(
        &self,
        _ctx: &CallContext,
        _request: DownloadShasumSignatureRequest,
    ) -> Result<BoxDownstream<DownloadShasumResponse>> {
        self.fail()
    }
}

#[async_trait]
impl ReleasePublisher for Unreachable {
    async fn publish(&self, _request: PublishRequest) -> Result<Response> {
        self.fail()
    }
}
