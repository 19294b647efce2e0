//! # Canopy Gateway
//!
//! Public entry point of the Canopy module and provider registry.
//!
//! This crate provides:
//! - **Gateway Router**: Every public operation mapped to its backend service
//! - **Backend clients**: Traits for the registrar, version, dependency, storage and release services
//! - **All-in-one mode**: In-process backends over the chunked storage service
//! - **REST protocols**: The module and provider registry protocols consumed by Terraform
//! - **Publishing API**: Registration, version transactions and artifact uploads under `/api/v1`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │             (terraform init, curl, etc.)            │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                  Canopy Gateway                     │
//! ├─────────────────────────────────────────────────────┤
//! │   Request Id │ Request Logging │ REST Handlers      │
//! ├─────────────────────────────────────────────────────┤
//! │        Gateway Router (module/provider/release)     │
//! ├─────────────────────────────────────────────────────┤
//! │   Registrar │ Versions │ Dependencies │ Storage     │
//! ├─────────────────────────────────────────────────────┤
//! │                   canopy-core                       │
//! │    (Stream Bridge, Version Lifecycle, Storage)      │
//! ├─────────────────────────────────────────────────────┤
//! │                canopy-objectstore                   │
//! │                (S3, in-memory)                      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod local;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use backends::Backends;
pub use config::GatewayConfig;
pub use error::ApiError;
pub use gateway::{Backend, Direction, Family, Gateway, Operation, Route};
pub use server::{run_server, run_server_with_shutdown, serve};
pub use state::AppState;
