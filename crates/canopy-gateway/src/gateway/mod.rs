//! Gateway Router
//!
//! Maps every public operation of the module, provider and release families
//! to the backend that serves it. Unary operations forward the request and
//! pass the backend's reply or error through unchanged. Streaming operations
//! hand the client leg and a freshly opened backend leg to the Stream Bridge.
//!
//! The gateway is stateless: every call is independent and version sessions
//! travel in the requests themselves.

mod module;
mod provider;
mod release;

pub use module::ModuleGateway;
pub use provider::ProviderGateway;
pub use release::ReleaseGateway;

use crate::backends::Backends;
use canopy_core::{
    tracing_observer, Artifact, Bridge, CallContext, CallInfo, Result, SharedObserver,
};
use std::future::Future;

/// Resource family an operation belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    Module,
    Provider,
    Release,
}

/// Backend service an operation is delegated to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    ModuleRegistrar,
    ProviderRegistrar,
    ModuleVersionManager,
    ProviderVersionManager,
    DependencyManager,
    ModuleStorage,
    ProviderStorage,
    ReleasePublisher,
}

impl Backend {
    /// Name used in "Failed to connect to ... service." errors
    pub fn service_name(&self) -> &'static str {
        match self {
            Backend::ModuleRegistrar => "Registrar",
            Backend::ProviderRegistrar => "Provider registrar",
            Backend::ModuleVersionManager => "Version manager",
            Backend::ProviderVersionManager => "Provider version manager",
            Backend::DependencyManager => "Dependency manager",
            Backend::ModuleStorage => "Storage",
            Backend::ProviderStorage => "Provider storage",
            Backend::ReleasePublisher => "Release",
        }
    }
}

/// Shape of a call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Unary,
    /// Client streams requests, backend answers once
    ClientStream,
    /// Client sends one request, backend streams replies
    ServerStream,
}

/// Where an operation goes and how
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub family: Family,
    pub backend: Backend,
    pub direction: Direction,
}

impl Route {
    const fn new(family: Family, backend: Backend, direction: Direction) -> Self {
        Self {
            family,
            backend,
            direction,
        }
    }
}

/// Every public gateway operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    RegisterModule,
    PublishTag,
    BeginModuleVersion,
    EndModuleVersion,
    RegisterModuleDependencies,
    RegisterContainerDependencies,
    Configure,
    ListModuleVersions,
    UploadSourceZip,
    DownloadSourceZip,
    RetrieveModuleDependencies,
    RetrieveContainerDependencies,
    RegisterProvider,
    BeginProviderVersion,
    EndProviderVersion,
    ListProviderVersions,
    GetProviderPlatform,
    UploadProviderBinaryZip,
    UploadShasum,
    UploadShasumSignature,
    DownloadProviderSourceZip,
    DownloadShasum,
    DownloadShasumSignature,
    PublishRelease,
}

impl Operation {
    pub const ALL: [Operation; 24] = [
        Operation::RegisterModule,
        Operation::PublishTag,
        Operation::BeginModuleVersion,
        Operation::EndModuleVersion,
        Operation::RegisterModuleDependencies,
        Operation::RegisterContainerDependencies,
        Operation::Configure,
        Operation::ListModuleVersions,
        Operation::UploadSourceZip,
        Operation::DownloadSourceZip,
        Operation::RetrieveModuleDependencies,
        Operation::RetrieveContainerDependencies,
        Operation::RegisterProvider,
        Operation::BeginProviderVersion,
        Operation::EndProviderVersion,
        Operation::ListProviderVersions,
        Operation::GetProviderPlatform,
        Operation::UploadProviderBinaryZip,
        Operation::UploadShasum,
        Operation::UploadShasumSignature,
        Operation::DownloadProviderSourceZip,
        Operation::DownloadShasum,
        Operation::DownloadShasumSignature,
        Operation::PublishRelease,
    ];

    /// Qualified operation name, as seen by observers
    pub fn name(&self) -> &'static str {
        match self {
            Operation::RegisterModule => "module/Register",
            Operation::PublishTag => "module/PublishTag",
            Operation::BeginModuleVersion => "module/BeginVersion",
            Operation::EndModuleVersion => "module/EndVersion",
            Operation::RegisterModuleDependencies => "module/RegisterModuleDependencies",
            Operation::RegisterContainerDependencies => "module/RegisterContainerDependencies",
            Operation::Configure => "module/Configure",
            Operation::ListModuleVersions => "module/ListModuleVersions",
            Operation::UploadSourceZip => "module/UploadSourceZip",
            Operation::DownloadSourceZip => "module/DownloadSourceZip",
            Operation::RetrieveModuleDependencies => "module/RetrieveModuleDependencies",
            Operation::RetrieveContainerDependencies => "module/RetrieveContainerDependencies",
            Operation::RegisterProvider => "provider/Register",
            Operation::BeginProviderVersion => "provider/BeginVersion",
            Operation::EndProviderVersion => "provider/EndVersion",
            Operation::ListProviderVersions => "provider/ListProviderVersions",
            Operation::GetProviderPlatform => "provider/GetVersionData",
            Operation::UploadProviderBinaryZip => "provider/UploadProviderBinaryZip",
            Operation::UploadShasum => "provider/UploadShasum",
            Operation::UploadShasumSignature => "provider/UploadShasumSignature",
            Operation::DownloadProviderSourceZip => "provider/DownloadProviderSourceZip",
            Operation::DownloadShasum => "provider/DownloadShasum",
            Operation::DownloadShasumSignature => "provider/DownloadShasumSignature",
            Operation::PublishRelease => "release/Publish",
        }
    }

    pub fn route(&self) -> Route {
        use Backend::*;
        use Direction::*;
        use Family::*;

        match self {
            Operation::RegisterModule | Operation::PublishTag | Operation::Configure => {
                Route::new(Module, ModuleRegistrar, Unary)
            }
            Operation::BeginModuleVersion
            | Operation::EndModuleVersion
            | Operation::ListModuleVersions => Route::new(Module, ModuleVersionManager, Unary),
            Operation::RegisterModuleDependencies | Operation::RegisterContainerDependencies => {
                Route::new(Module, DependencyManager, Unary)
            }
            Operation::RetrieveModuleDependencies | Operation::RetrieveContainerDependencies => {
                Route::new(Module, DependencyManager, ServerStream)
            }
            Operation::UploadSourceZip => Route::new(Module, ModuleStorage, ClientStream),
            Operation::DownloadSourceZip => Route::new(Module, ModuleStorage, ServerStream),
            Operation::RegisterProvider => Route::new(Provider, ProviderRegistrar, Unary),
            Operation::BeginProviderVersion
            | Operation::EndProviderVersion
            | Operation::ListProviderVersions
            | Operation::GetProviderPlatform => Route::new(Provider, ProviderVersionManager, Unary),
            Operation::UploadProviderBinaryZip
            | Operation::UploadShasum
            | Operation::UploadShasumSignature => Route::new(Provider, ProviderStorage, ClientStream),
            Operation::DownloadProviderSourceZip
            | Operation::DownloadShasum
            | Operation::DownloadShasumSignature => Route::new(Provider, ProviderStorage, ServerStream),
            Operation::PublishRelease => Route::new(Release, ReleasePublisher, Unary),
        }
    }

    /// Artifact moved by a streaming operation
    pub fn artifact(&self) -> Option<Artifact> {
        match self {
            Operation::UploadSourceZip | Operation::DownloadSourceZip => Some(Artifact::SourceZip),
            Operation::UploadProviderBinaryZip | Operation::DownloadProviderSourceZip => {
                Some(Artifact::BinaryZip)
            }
            Operation::UploadShasum | Operation::DownloadShasum => Some(Artifact::Shasum),
            Operation::UploadShasumSignature | Operation::DownloadShasumSignature => {
                Some(Artifact::ShasumSignature)
            }
            Operation::RetrieveModuleDependencies => Some(Artifact::ModuleDependencies),
            Operation::RetrieveContainerDependencies => Some(Artifact::ContainerDependencies),
            _ => None,
        }
    }
}

/// Entry point for every public operation
#[derive(Clone)]
pub struct Gateway {
    backends: Backends,
    observer: SharedObserver,
}

impl Gateway {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            observer: tracing_observer(),
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn modules(&self) -> ModuleGateway<'_> {
        ModuleGateway::new(self)
    }

    pub fn providers(&self) -> ProviderGateway<'_> {
        ProviderGateway::new(self)
    }

    pub fn releases(&self) -> ReleaseGateway<'_> {
        ReleaseGateway::new(self)
    }

    /// Delegate one unary call, notifying the observer and passing the
    /// backend's outcome through untouched.
    pub(crate) async fn unary<T, F>(
        &self,
        ctx: &CallContext,
        operation: Operation,
        resource: Option<String>,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        debug_assert_eq!(operation.route().direction, Direction::Unary);

        let mut info = CallInfo::new(operation.name(), ctx.request_id());
        if let Some(resource) = resource {
            info = info.with_resource(resource);
        }

        self.observer.on_start(&info);
        let result = ctx.run(call).await.and_then(|reply| reply);
        self.observer.on_finish(&info, None, result.as_ref().err());
        result
    }

    /// Bridge for one streaming call
    pub(crate) fn bridge<'a>(
        &'a self,
        ctx: &'a CallContext,
        operation: Operation,
        resource: Option<String>,
    ) -> Bridge<'a> {
        debug_assert_ne!(operation.route().direction, Direction::Unary);

        let artifact = operation.artifact().unwrap_or(Artifact::SourceZip);
        let bridge = Bridge::new(ctx, self.observer.as_ref(), operation.name(), artifact);
        match resource {
            Some(resource) => bridge.with_resource(resource),
            None => bridge,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use canopy_core::{CallInfo, CallObserver, Progress, RegistryError, StreamOutcome};
    use std::sync::Mutex;

    /// Observer recording operation names and outcomes
    #[derive(Default)]
    pub struct RecordingObserver {
        pub started: Mutex<Vec<&'static str>>,
        pub messages: Mutex<u64>,
        pub finished: Mutex<Vec<(&'static str, Option<StreamOutcome>, Option<String>)>>,
    }

    impl CallObserver for RecordingObserver {
        fn on_start(&self, call: &CallInfo) {
            self.started.lock().unwrap().push(call.operation);
        }

        fn on_progress(&self, _call: &CallInfo, progress: Progress) {
            *self.messages.lock().unwrap() = progress.messages;
        }

        fn on_finish(
            &self,
            call: &CallInfo,
            outcome: Option<StreamOutcome>,
            error: Option<&RegistryError>,
        ) {
            self.finished.lock().unwrap().push((
                call.operation,
                outcome,
                error.map(|e| e.to_string()),
            ));
        }
    }
}
