//! # Canopy
//!
//! Backend of a private module and provider registry. This facade re-exports
//! the workspace crates so integration tests and embedders can depend on a
//! single package.

pub use canopy_core as core;
pub use canopy_gateway as gateway;
pub use canopy_objectstore as objectstore;
