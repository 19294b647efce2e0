//! In-memory dependency manager
//!
//! Returns exactly what was registered for the version asked about. Nothing
//! is resolved transitively.

use crate::backends::{BoxDownstream, DependencyManager};
use async_trait::async_trait;
use canopy_core::messages::{
    ContainerDependenciesResponse, ContainerImage, ModuleDependenciesResponse,
    RegisterContainerDependenciesRequest, RegisterModuleDependenciesRequest, Response,
    RetrieveContainerDependenciesRequest, RetrieveModuleDependenciesRequest, VersionedName,
};
use canopy_core::{CallContext, ChannelDownstream, RegistryError, Result};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tonic::Status;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryDependencyManager {
    modules: DashMap<VersionedName, Vec<VersionedName>>,
    containers: DashMap<VersionedName, Vec<ContainerImage>>,
}

impl MemoryDependencyManager {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A downstream call yielding one message
fn single<T: Send + 'static>(message: T) -> Result<BoxDownstream<T>> {
    let (tx, rx) = mpsc::channel(1);
    tx.try_send(Ok(message))
        .map_err(|_| RegistryError::Backend(Status::internal("dependency stream closed")))?;
    Ok(Box::new(ChannelDownstream::new(rx)))
}

#[async_trait]
impl DependencyManager for MemoryDependencyManager {
    async fn register_module_dependencies(
        &self,
        request: RegisterModuleDependenciesRequest,
    ) -> Result<Response> {
        debug!(module = %request.module, count = request.dependencies.len(), "module dependencies registered");
        self.modules.insert(request.module, request.dependencies);
        Ok(Response::new("Module dependencies successfully registered."))
    }

    async fn register_container_dependencies(
        &self,
        request: RegisterContainerDependenciesRequest,
    ) -> Result<Response> {
        debug!(module = %request.module, count = request.images.len(), "container dependencies registered");
        self.containers.insert(request.module, request.images);
        Ok(Response::new("Container dependencies successfully registered."))
    }

    async fn retrieve_module_dependencies(
        &self,
        _ctx: &CallContext,
        request: RetrieveModuleDependenciesRequest,
    ) -> Result<BoxDownstream<ModuleDependenciesResponse>> {
        let dependencies = self
            .modules
            .get(&request.module)
            .map(|deps| deps.clone())
            .unwrap_or_default();
        single(ModuleDependenciesResponse {
            module: request.module,
            dependencies,
        })
    }

    async fn retrieve_container_dependencies(
        &self,
        _ctx: &CallContext,
        request: RetrieveContainerDependenciesRequest,
    ) -> Result<BoxDownstream<ContainerDependenciesResponse>> {
        let images = self
            .containers
            .get(&request.module)
            .map(|images| images.clone())
            .unwrap_or_default();
        single(ContainerDependenciesResponse {
            module: request.module,
            images,
        })
    }
}
