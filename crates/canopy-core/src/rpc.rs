//! Capability traits over streaming RPC calls
//!
//! The bridge and the storage service only need to receive, send and
//! half-close. These traits name exactly those capabilities so any transport
//! can be plugged in: `tonic::Streaming` through [`StreamSource`], or tokio
//! channels for in-process backends and tests.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

/// Failure of a send on one leg of a call
#[derive(Debug, Error)]
pub enum SinkError {
    /// The peer stopped accepting messages (end-of-stream on send)
    #[error("stream closed by peer")]
    Closed,

    /// Transport error other than end-of-stream
    #[error("transport error: {}", .0.message())]
    Transport(#[source] Status),
}

/// Receiving half of a stream
#[async_trait]
pub trait MessageSource<T: Send>: Send {
    /// Next message, `Ok(None)` on clean end-of-stream
    async fn recv(&mut self) -> Result<Option<T>, Status>;
}

/// Sending half of a stream
#[async_trait]
pub trait MessageSink<T: Send>: Send {
    async fn send(&mut self, msg: T) -> Result<(), SinkError>;
}

/// Client side of a client-streaming backend call
#[async_trait]
pub trait UpstreamCall<Req: Send, Resp: Send>: MessageSink<Req> {
    /// Half-close without waiting for the reply
    async fn close_send(&mut self);

    /// Half-close and wait for the final reply
    async fn close_and_recv(&mut self) -> Result<Resp, Status>;
}

/// Client side of a server-streaming backend call
#[async_trait]
pub trait DownstreamCall<T: Send>: MessageSource<T> {
    /// Tell the backend no more messages will be consumed
    async fn close_send(&mut self);
}

#[async_trait]
impl<T: Send, S: MessageSource<T> + ?Sized> MessageSource<T> for Box<S> {
    async fn recv(&mut self) -> Result<Option<T>, Status> {
        (**self).recv().await
    }
}

// Written without `#[async_trait]` so the forwarded future does not need
// `T: 'async_trait`; equivalent to `(**self).send(msg).await`.
impl<T: Send, S: MessageSink<T> + ?Sized> MessageSink<T> for Box<S> {
    fn send<'life0, 'async_trait>(
        &'life0 mut self,
        msg: T,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        Self: 'async_trait,
    {
        (**self).send(msg)
    }
}

#[async_trait]
impl<Req: Send, Resp: Send, S: UpstreamCall<Req, Resp> + ?Sized> UpstreamCall<Req, Resp> for Box<S> {
    async fn close_send(&mut self) {
        (**self).close_send().await
    }

    async fn close_and_recv(&mut self) -> Result<Resp, Status> {
        (**self).close_and_recv().await
    }
}

#[async_trait]
impl<T: Send, S: DownstreamCall<T> + ?Sized> DownstreamCall<T> for Box<S> {
    async fn close_send(&mut self) {
        (**self).close_send().await
    }
}

/// Adapts any `Stream` of results, such as `tonic::Streaming`, to a [`MessageSource`]
#[derive(Debug)]
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<T, S> MessageSource<T> for StreamSource<S>
where
    T: Send,
    S: Stream<Item = Result<T, Status>> + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<T>, Status> {
        self.inner.next().await.transpose()
    }
}

/// Sender feeding a channel-backed stream
#[derive(Debug)]
pub struct ChannelSink<T> {
    tx: mpsc::Sender<Result<T, Status>>,
}

impl<T> ChannelSink<T> {
    pub fn new(tx: mpsc::Sender<Result<T, Status>>) -> Self {
        Self { tx }
    }

    /// Deliver a transport error to the receiving side
    pub async fn send_error(&mut self, status: Status) -> Result<(), SinkError> {
        self.tx.send(Err(status)).await.map_err(|_| SinkError::Closed)
    }

    /// Whether the receiving side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for ChannelSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

#[async_trait]
impl<T: Send> MessageSink<T> for ChannelSink<T> {
    async fn send(&mut self, msg: T) -> Result<(), SinkError> {
        self.tx.send(Ok(msg)).await.map_err(|_| SinkError::Closed)
    }
}

/// Bounded in-process stream: a sink and the source it feeds
pub fn message_channel<T>(
    capacity: usize,
) -> (ChannelSink<T>, StreamSource<ReceiverStream<Result<T, Status>>>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink::new(tx), StreamSource::new(ReceiverStream::new(rx)))
}

/// Channel-backed client-streaming call
///
/// Messages go to the backend through `tx`, the final reply resolves once the
/// backend handler finishes.
pub struct ChannelUpstream<Req, Resp> {
    tx: Option<mpsc::Sender<Result<Req, Status>>>,
    reply: Option<BoxFuture<'static, Result<Resp, Status>>>,
}

impl<Req, Resp> ChannelUpstream<Req, Resp> {
    pub fn new<F>(tx: mpsc::Sender<Result<Req, Status>>, reply: F) -> Self
    where
        F: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        Self {
            tx: Some(tx),
            reply: Some(reply.boxed()),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for ChannelUpstream<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelUpstream")
            .field("open", &self.tx.is_some())
            .field("replied", &self.reply.is_none())
            .finish()
    }
}

#[async_trait]
impl<Req: Send, Resp: Send> MessageSink<Req> for ChannelUpstream<Req, Resp> {
    async fn send(&mut self, msg: Req) -> Result<(), SinkError> {
        match &self.tx {
            Some(tx) => tx.send(Ok(msg)).await.map_err(|_| SinkError::Closed),
            None => Err(SinkError::Closed),
        }
    }
}

#[async_trait]
impl<Req: Send, Resp: Send> UpstreamCall<Req, Resp> for ChannelUpstream<Req, Resp> {
    async fn close_send(&mut self) {
        self.tx = None;
    }

    async fn close_and_recv(&mut self) -> Result<Resp, Status> {
        self.tx = None;
        match self.reply.take() {
            Some(reply) => reply.await,
            None => Err(Status::failed_precondition("reply already received")),
        }
    }
}

impl<Req, Resp> Drop for ChannelUpstream<Req, Resp> {
    fn drop(&mut self) {
        // Abandoned before the reply: end the stream with an error so the
        // backend does not take the messages so far as a complete upload.
        if let (Some(tx), Some(_)) = (self.tx.take(), self.reply.as_ref()) {
            let _ = tx.try_send(Err(Status::cancelled("call dropped before completion")));
        }
    }
}

/// Channel-backed server-streaming call
#[derive(Debug)]
pub struct ChannelDownstream<T> {
    inner: ReceiverStream<Result<T, Status>>,
}

impl<T> ChannelDownstream<T> {
    pub fn new(rx: mpsc::Receiver<Result<T, Status>>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

#[async_trait]
impl<T: Send> MessageSource<T> for ChannelDownstream<T> {
    async fn recv(&mut self) -> Result<Option<T>, Status> {
        self.inner.next().await.transpose()
    }
}

#[async_trait]
impl<T: Send> DownstreamCall<T> for ChannelDownstream<T> {
    async fn close_send(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_channel_roundtrip() {
        let (mut sink, mut source) = message_channel::<u32>(4);

        sink.send(1).await.unwrap();
        sink.send_error(Status::internal("boom")).await.unwrap();
        drop(sink);

        assert_eq!(source.recv().await.unwrap(), Some(1));
        assert_eq!(source.recv().await.unwrap_err().message(), "boom");
        assert_eq!(source.recv().await.unwrap(), None);
    }

    #[test]
    fn test_source_waits_for_sender() {
        let (mut sink, mut source) = message_channel::<u32>(1);
        let mut recv = tokio_test::task::spawn(source.recv());

        tokio_test::assert_pending!(recv.poll());

        tokio_test::block_on(sink.send(7)).unwrap();
        assert!(recv.is_woken());
        let received = tokio_test::assert_ready!(recv.poll());
        assert_eq!(received.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_sink_reports_closed_peer() {
        let (mut sink, source) = message_channel::<u32>(1);
        drop(source);

        assert!(sink.is_closed());
        assert!(matches!(sink.send(1).await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_upstream_close_and_recv() {
        let (tx, rx) = mpsc::channel(4);
        let handler = tokio::spawn(async move {
            let mut source = StreamSource::new(ReceiverStream::new(rx));
            let mut total = 0u32;
            while let Some(n) = source.recv().await? {
                total += n;
            }
            Ok::<_, Status>(total)
        });
        let mut call = ChannelUpstream::new(tx, async move {
            handler
                .await
                .map_err(|e| Status::internal(e.to_string()))?
        });

        call.send(2).await.unwrap();
        call.send(3).await.unwrap();

        assert_eq!(call.close_and_recv().await.unwrap(), 5);
        assert!(matches!(call.send(1).await, Err(SinkError::Closed)));
        assert!(call.close_and_recv().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_upstream_ends_with_error() {
        let (tx, rx) = mpsc::channel(4);
        let mut backend = StreamSource::new(ReceiverStream::new(rx));
        let mut call = ChannelUpstream::new(tx, async { Ok::<u32, Status>(0) });

        call.send(1).await.unwrap();
        drop(call);

        assert_eq!(backend.recv().await.unwrap(), Some(1));
        let status = backend.recv().await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Cancelled);
        assert_eq!(backend.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_half_closed_upstream_ends_cleanly() {
        let (tx, rx) = mpsc::channel(4);
        let mut backend = StreamSource::new(ReceiverStream::new(rx));
        let mut call = ChannelUpstream::new(tx, async { Ok::<u32, Status>(0) });

        call.send(1).await.unwrap();
        call.close_send().await;
        drop(call);

        assert_eq!(backend.recv().await.unwrap(), Some(1));
        assert_eq!(backend.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_downstream_close_send_stops_backend() {
        let (tx, rx) = mpsc::channel::<Result<u32, Status>>(1);
        let mut call = ChannelDownstream::new(rx);

        call.close_send().await;

        assert!(tx.send(Ok(1)).await.is_err());
        assert_eq!(call.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_boxed_source() {
        let (mut sink, source) = message_channel::<&'static str>(2);
        let mut boxed: Box<dyn MessageSource<&'static str>> = Box::new(source);

        sink.send("a").await.unwrap();
        assert_eq!(boxed.recv().await.unwrap(), Some("a"));
    }
}
