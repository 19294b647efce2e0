//! In-process storage backend
//!
//! Each streaming call spawns a handler task running the [`StorageService`]
//! on the far side of a bounded channel, the way a remote storage process
//! would serve it.

use crate::backends::{BoxDownstream, BoxUpstream, ModuleStorage, ProviderStorage};
use async_trait::async_trait;
use canopy_core::messages::{
    DownloadProviderSourceZipRequest, DownloadShasumRequest, DownloadShasumResponse,
    DownloadShasumSignatureRequest, DownloadSourceZipRequest, Response, SourceZipResponse,
    UploadProviderBinaryZipRequest, UploadShasumRequest, UploadShasumSignatureRequest,
    UploadSourceZipRequest,
};
use canopy_core::{
    CallContext, ChannelDownstream, ChannelSink, ChannelUpstream, ChunkedDownload, ChunkedUpload,
    MessageSink, MessageSource, RegistryError, ResourceRequest, Result, SinkError, StorageService,
    StreamSource, UpstreamCall, DEFAULT_CHANNEL_CAPACITY,
};
use canopy_objectstore::ObjectStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::debug;

/// Storage backend served by a local [`StorageService`]
pub struct LocalStorage<S> {
    service: Arc<StorageService<S>>,
    capacity: usize,
}

impl<S> Clone for LocalStorage<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            capacity: self.capacity,
        }
    }
}

impl<S: ObjectStore + 'static> LocalStorage<S> {
    pub fn new(service: Arc<StorageService<S>>) -> Self {
        Self {
            service,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Messages buffered between the gateway and the handler task
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn service(&self) -> &StorageService<S> {
        &self.service
    }

    fn open_upload<M>(&self, ctx: &CallContext) -> BoxUpstream<M, Response>
    where
        M: ChunkedUpload + 'static,
    {
        let (tx, rx) = mpsc::channel(self.capacity);
        let service = Arc::clone(&self.service);
        let ctx = ctx.child();
        let abort = ctx.cancellation_token().clone();

        let handler = tokio::spawn(async move {
            let mut source = StreamSource::new(ReceiverStream::new(rx));
            let result = service.upload::<M, _>(&ctx, &mut source).await;
            if result.is_err() {
                // Read the rest of the stream so the failure is reported by
                // the final reply rather than by a closed channel
                while let Ok(Some(_)) = source.recv().await {}
            }
            result.map_err(Status::from)
        });

        let reply = async move {
            match handler.await {
                Ok(result) => result,
                Err(err) => Err(Status::internal(format!("storage handler failed: {}", err))),
            }
        };
        Box::new(HandlerUpstream {
            call: ChannelUpstream::new(tx, reply),
            abort,
        })
    }

    fn open_download<Q, R>(&self, ctx: &CallContext, request: Q) -> BoxDownstream<R>
    where
        Q: ResourceRequest + Send + Sync + 'static,
        R: ChunkedDownload + 'static,
    {
        let (tx, rx) = mpsc::channel(self.capacity);
        let service = Arc::clone(&self.service);
        let ctx = ctx.child();

        tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            match service.download::<Q, R, _>(&ctx, &request, &mut sink).await {
                Ok(()) => {}
                // The gateway side is gone, nobody is left to tell
                Err(RegistryError::SendFailed { .. }) => {}
                Err(err) => {
                    if sink.send_error(Status::from(err)).await.is_err() {
                        debug!("download failed after the caller went away");
                    }
                }
            }
        });

        Box::new(ChannelDownstream::new(rx))
    }
}

/// Upload call whose handler is cancelled if the call is dropped before
/// `close_and_recv`, so a broken client stream never reaches the store.
struct HandlerUpstream<Req, Resp> {
    call: ChannelUpstream<Req, Resp>,
    abort: CancellationToken,
}

impl<Req, Resp> Drop for HandlerUpstream<Req, Resp> {
    fn drop(&mut self) {
        // Runs before `call` drops its sender, so the handler observes the
        // cancellation ahead of the end of stream.
        self.abort.cancel();
    }
}

#[async_trait]
impl<Req: Send, Resp: Send> MessageSink<Req> for HandlerUpstream<Req, Resp> {
    async fn send(&mut self, msg: Req) -> std::result::Result<(), SinkError> {
        self.call.send(msg).await
    }
}

#[async_trait]
impl<Req: Send, Resp: Send> UpstreamCall<Req, Resp> for HandlerUpstream<Req, Resp> {
    async fn close_send(&mut self) {
        self.call.close_send().await
    }

    async fn close_and_recv(&mut self) -> std::result::Result<Resp, Status> {
        self.call.close_and_recv().await
    }
}

#[async_trait]
impl<S: ObjectStore + 'static> ModuleStorage for LocalStorage<S> {
    async fn upload_source_zip(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadSourceZipRequest, Response>> {
        Ok(self.open_upload(ctx))
    }

    async fn download_source_zip(
        &self,
        ctx: &CallContext,
        request: DownloadSourceZipRequest,
    ) -> Result<BoxDownstream<SourceZipResponse>> {
        Ok(self.open_download(ctx, request))
    }
}

#[async_trait]
impl<S: ObjectStore + 'static> ProviderStorage for LocalStorage<S> {
    async fn upload_provider_binary_zip(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadProviderBinaryZipRequest, Response>> {
        Ok(self.open_upload(ctx))
    }

    async fn upload_shasum(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadShasumRequest, Response>> {
        Ok(self.open_upload(ctx))
    }

    async fn upload_shasum_signature(
        &self,
        ctx: &CallContext,
    ) -> Result<BoxUpstream<UploadShasumSignatureRequest, Response>> {
        Ok(self.open_upload(ctx))
    }

    async fn download_provider_source_zip(
        &self,
        ctx: &CallContext,
        request: DownloadProviderSourceZipRequest,
    ) -> Result<BoxDownstream<SourceZipResponse>> {
        Ok(self.open_download(ctx, request))
    }

    async fn download_shasum(
        &self,
        ctx: &CallContext,
        request: DownloadShasumRequest,
    ) -> Result<BoxDownstream<DownloadShasumResponse>> {
        Ok(self.open_download(ctx, request))
    }

    async fn download_shasum_signature(
        &self,
        ctx: &CallContext,
        request: DownloadShasumSignatureRequest,
    ) -> Result<BoxDownstream<DownloadShasumResponse>> {
        Ok(self.open_download(ctx, request))
    }
}
