//! # Canopy Core
//!
//! Core engine of the Canopy module and provider registry.
//!
//! This crate provides:
//! - **Resource keys**: Validated identities of stored artifacts and their object keys
//! - **Stream Bridge**: One generic forwarding primitive for every streaming RPC
//! - **Chunked Storage**: Client-streamed uploads and server-streamed downloads over an object store
//! - **Version Lifecycle**: The begin / publish-or-discard transaction
//! - **Observer hooks**: Call start, progress and outcome callbacks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Gateway Router              │
//! ├────────────────────┬────────────────────┤
//! │   Stream Bridge    │ Version Lifecycle  │
//! ├────────────────────┴────────────────────┤
//! │     RPC capability traits + context     │
//! ├─────────────────────────────────────────┤
//! │        Chunked Storage Service          │
//! ├─────────────────────────────────────────┤
//! │        ObjectStore (objectstore)        │
//! └─────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod observe;
pub mod resource;
pub mod rpc;
pub mod storage;

pub use bridge::{forward_client_stream, forward_server_stream, Bridge};
pub use context::CallContext;
pub use error::{RegistryError, Result, TERMINATION_METADATA_KEY};
pub use lifecycle::{LifecycleState, VersionBackend, VersionLifecycle};
pub use messages::VersionAction;
pub use observe::{
    tracing_observer, CallInfo, CallObserver, NoopObserver, Progress, SharedObserver, StreamOutcome,
    TracingObserver,
};
pub use resource::{Artifact, Namespace, Platform, ResourceKey};
pub use rpc::{
    message_channel, ChannelDownstream, ChannelSink, ChannelUpstream, DownstreamCall,
    MessageSink, MessageSource, SinkError, StreamSource, UpstreamCall,
};
pub use storage::{ChunkedDownload, ChunkedUpload, ResourceRequest, StorageConfig, StorageService};

/// Default capacity of in-process message channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
