//! In-process backends for the all-in-one gateway
//!
//! The registrar, version, dependency and release services keep their state
//! in memory. Storage runs the chunked storage service against the
//! configured object store.

mod catalog;
mod dependencies;
mod registrar;
mod release;
mod storage;
mod versions;

pub use catalog::ProviderCatalog;
pub use dependencies::MemoryDependencyManager;
pub use registrar::{MemoryRegistrar, ProviderRelease, Registration};
pub use release::{MemoryReleasePublisher, ReleaseRecord};
pub use storage::LocalStorage;
pub use versions::{MemoryVersionManager, VersionSession};

use crate::backends::Backends;
use canopy_core::StorageService;
use canopy_objectstore::ObjectStore;
use std::sync::Arc;

/// Every backend served in this process, with `storage` behind both storage
/// families
pub fn all_in_one<S: ObjectStore + 'static>(storage: Arc<StorageService<S>>) -> Backends {
    let storage = LocalStorage::new(storage);
    let module_versions = Arc::new(MemoryVersionManager::new());
    let provider_registrar = Arc::new(MemoryRegistrar::new());
    let provider_versions = Arc::new(MemoryVersionManager::new());
    let catalog = ProviderCatalog::new(provider_registrar.clone(), provider_versions.clone());

    Backends {
        module_registrar: Arc::new(MemoryRegistrar::new()),
        provider_registrar,
        module_versions: module_versions.clone(),
        provider_versions,
        module_version_index: module_versions,
        provider_version_index: Arc::new(catalog),
        dependencies: Arc::new(MemoryDependencyManager::new()),
        module_storage: Arc::new(storage.clone()),
        provider_storage: Arc::new(storage),
        releases: Arc::new(MemoryReleasePublisher::new()),
    }
}
