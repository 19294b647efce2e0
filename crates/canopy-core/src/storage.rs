//! Chunked Storage Service
//!
//! Moves artifacts between a streaming RPC boundary and an object store.
//! Uploads are reassembled in memory and written with a single `put`;
//! downloads are read fully, checked against the declared length, then
//! re-chunked and streamed in order.

use crate::context::CallContext;
use crate::error::{RegistryError, Result};
use crate::messages::Response;
use crate::observe::{tracing_observer, CallInfo, Progress, SharedObserver, StreamOutcome};
use crate::resource::{Artifact, ResourceKey};
use crate::rpc::{MessageSink, MessageSource};
use bytes::Bytes;
use canopy_objectstore::{Chunker, ObjectStore, ObjectStoreError, Reassembler, DEFAULT_CHUNK_SIZE};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Upper bound on the buffer reserved up front from a declared length
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// A message that addresses one stored artifact
pub trait ResourceRequest {
    const ARTIFACT: Artifact;

    fn resource_key(&self) -> Result<ResourceKey>;
}

/// A client-streamed upload message carrying one chunk
pub trait ChunkedUpload: ResourceRequest + Send {
    fn into_chunk(self) -> Bytes;
}

/// A server-streamed download message carrying one chunk
pub trait ChunkedDownload: Send {
    fn from_chunk(chunk: Bytes) -> Self;

    fn chunk(&self) -> &[u8];
}

/// Immutable storage configuration, fixed at startup
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub chunk_size: usize,
}

impl StorageConfig {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Storage service over any [`ObjectStore`]
pub struct StorageService<S> {
    store: S,
    config: StorageConfig,
    chunker: Chunker,
    observer: SharedObserver,
}

impl<S: ObjectStore> StorageService<S> {
    /// Create a service, rejecting an invalid chunk size
    pub fn new(store: S, config: StorageConfig) -> canopy_objectstore::Result<Self> {
        let chunker = Chunker::with_chunk_size(config.chunk_size)?;
        Ok(Self {
            store,
            config,
            chunker,
            observer: tracing_observer(),
        })
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Make sure the bucket exists, called once at startup
    pub async fn initialize(&self) -> Result<()> {
        self.store
            .ensure_bucket_exists(&self.config.bucket, &self.config.region)
            .await
            .map_err(RegistryError::BucketInitialization)?;
        info!(bucket = %self.config.bucket, region = %self.config.region, "storage bucket ready");
        Ok(())
    }

    /// Receive a client-streamed artifact and store it as one object.
    ///
    /// The object key comes from the first message. Nothing is written unless
    /// the client ends its stream cleanly.
    pub async fn upload<M, C>(&self, ctx: &CallContext, client: &mut C) -> Result<Response>
    where
        M: ChunkedUpload,
        C: MessageSource<M> + ?Sized,
    {
        let mut info = CallInfo::new("Upload", ctx.request_id());
        self.observer.on_start(&info);

        let result = self.receive_and_store(ctx, client, &mut info).await;
        let outcome = match &result {
            Ok(_) => Some(StreamOutcome::ClientEof),
            Err(RegistryError::ReceiveFailed { .. }) => Some(StreamOutcome::ClientError),
            Err(_) => None,
        };
        self.observer
            .on_finish(&info, outcome, result.as_ref().err());
        result
    }

    async fn receive_and_store<M, C>(
        &self,
        ctx: &CallContext,
        client: &mut C,
        info: &mut CallInfo,
    ) -> Result<Response>
    where
        M: ChunkedUpload,
        C: MessageSource<M> + ?Sized,
    {
        let mut key: Option<ResourceKey> = None;
        let mut buffer = Reassembler::new();

        loop {
            match ctx.run(client.recv()).await? {
                Ok(Some(message)) => {
                    if key.is_none() {
                        let resource = message.resource_key()?;
                        info.resource = Some(resource.object_key());
                        key = Some(resource);
                    }
                    buffer.push(&message.into_chunk());
                    self.observer.on_progress(
                        info,
                        Progress {
                            messages: buffer.chunks_received() as u64,
                            bytes: buffer.len() as u64,
                        },
                    );
                }
                Ok(None) => break,
                Err(status) => {
                    return Err(RegistryError::ReceiveFailed {
                        artifact: M::ARTIFACT,
                        source: status,
                    });
                }
            }
        }

        let key = key.ok_or_else(|| RegistryError::InvalidResource("empty upload".to_string()))?;
        let object_key = key.object_key();
        let size = buffer.len();

        ctx.run(
            self.store
                .put_object(&self.config.bucket, &object_key, buffer.finish()),
        )
        .await?
        .map_err(|source| RegistryError::UploadFailed {
            artifact: M::ARTIFACT,
            source,
        })?;

        info!(key = %object_key, size, artifact = %M::ARTIFACT, "artifact stored");
        Ok(Response::new(M::ARTIFACT.uploaded_message()))
    }

    /// Stream a stored artifact to the client in chunks.
    ///
    /// The whole object is read and its length checked before the first chunk
    /// is sent.
    pub async fn download<Q, R, K>(&self, ctx: &CallContext, request: &Q, sink: &mut K) -> Result<()>
    where
        Q: ResourceRequest,
        R: ChunkedDownload,
        K: MessageSink<R> + ?Sized,
    {
        let mut info = CallInfo::new("Download", ctx.request_id());
        self.observer.on_start(&info);

        let result = self.load_and_send(ctx, request, sink, &mut info).await;
        let outcome = match &result {
            Ok(()) => Some(StreamOutcome::BackendEof),
            Err(RegistryError::SendFailed { .. }) => Some(StreamOutcome::ClientError),
            Err(_) => None,
        };
        self.observer
            .on_finish(&info, outcome, result.as_ref().err());
        result
    }

    async fn load_and_send<Q, R, K>(
        &self,
        ctx: &CallContext,
        request: &Q,
        sink: &mut K,
        info: &mut CallInfo,
    ) -> Result<()>
    where
        Q: ResourceRequest,
        R: ChunkedDownload,
        K: MessageSink<R> + ?Sized,
    {
        let artifact = Q::ARTIFACT;
        let object_key = request.resource_key()?.object_key();
        info.resource = Some(object_key.clone());

        let object = ctx
            .run(self.store.get_object(&self.config.bucket, &object_key))
            .await?
            .map_err(|source| RegistryError::DownloadFailed { artifact, source })?;

        let expected = object.content_length;
        let mut body = object.body;
        let mut data = Vec::with_capacity(expected.min(MAX_PREALLOCATION) as usize);
        let actual = ctx
            .run(body.read_to_end(&mut data))
            .await?
            .map_err(|e| RegistryError::DownloadFailed {
                artifact,
                source: ObjectStoreError::Io(e),
            })? as u64;

        if actual != expected {
            return Err(RegistryError::ContentLengthMismatch {
                artifact,
                expected,
                actual,
            });
        }
        debug!(key = %object_key, size = actual, "object read");

        let mut progress = Progress::default();
        for chunk in self.chunker.split(Bytes::from(data)) {
            let len = chunk.len() as u64;
            ctx.run(sink.send(R::from_chunk(chunk)))
                .await?
                .map_err(|source| RegistryError::SendFailed { artifact, source })?;
            progress.messages += 1;
            progress.bytes += len;
            self.observer.on_progress(info, progress);
        }

        info!(key = %object_key, chunks = progress.messages, "artifact sent");
        Ok(())
    }
}
