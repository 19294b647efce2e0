//! Stream Bridge
//!
//! One generic forwarding primitive shared by every streaming operation of
//! every resource family. A bridge pumps messages between the client-facing
//! leg and the backend-facing leg of one call, strictly sequentially:
//!
//! - at most one message is in flight and messages are never reordered
//! - exactly one terminal action happens per call (a reply, a close or an error)
//! - once a call is aborted no further I/O is attempted on either leg
//!
//! Every suspension point runs under the call's [`CallContext`], so
//! cancellation or an expired deadline unblocks a pending receive or send.

use crate::context::CallContext;
use crate::error::{RegistryError, Result};
use crate::observe::{CallInfo, CallObserver, Progress, StreamOutcome};
use crate::resource::Artifact;
use crate::rpc::{DownstreamCall, MessageSink, MessageSource, SinkError, UpstreamCall};
use std::future::Future;

/// Forwarding state of one bridged call
pub struct Bridge<'a> {
    ctx: &'a CallContext,
    observer: &'a dyn CallObserver,
    info: CallInfo,
    artifact: Artifact,
    progress: Progress,
}

impl<'a> Bridge<'a> {
    pub fn new(
        ctx: &'a CallContext,
        observer: &'a dyn CallObserver,
        operation: &'static str,
        artifact: Artifact,
    ) -> Self {
        Self {
            ctx,
            observer,
            info: CallInfo::new(operation, ctx.request_id()),
            artifact,
            progress: Progress::default(),
        }
    }

    /// Attach the resource being transferred, for observers
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.info = self.info.with_resource(resource);
        self
    }

    /// Client-streaming mode: relay client messages into a backend call and
    /// return the backend's final reply.
    ///
    /// `early_close_reply` is returned when the backend stops accepting input
    /// before the client is done, which counts as a successful close.
    pub async fn forward_client_stream<Req, Resp, C, U, O>(
        mut self,
        client: &mut C,
        open: O,
        early_close_reply: Resp,
    ) -> Result<Resp>
    where
        Req: Send,
        Resp: Send,
        C: MessageSource<Req> + ?Sized,
        U: UpstreamCall<Req, Resp>,
        O: Future<Output = Result<U>>,
    {
        self.observer.on_start(&self.info);
        let (outcome, result) = self.pump_upstream(client, open, early_close_reply).await;
        self.observer
            .on_finish(&self.info, outcome, result.as_ref().err());
        result
    }

    /// Server-streaming mode: relay every backend message to the client until
    /// the backend ends its stream.
    pub async fn forward_server_stream<T, D, K, O>(mut self, open: O, client: &mut K) -> Result<()>
    where
        T: Send,
        D: DownstreamCall<T>,
        K: MessageSink<T> + ?Sized,
        O: Future<Output = Result<D>>,
    {
        self.observer.on_start(&self.info);
        let (outcome, result) = self.pump_downstream(open, client).await;
        self.observer
            .on_finish(&self.info, outcome, result.as_ref().err());
        result
    }

    async fn pump_upstream<Req, Resp, C, U, O>(
        &mut self,
        client: &mut C,
        open: O,
        early_close_reply: Resp,
    ) -> (Option<StreamOutcome>, Result<Resp>)
    where
        Req: Send,
        Resp: Send,
        C: MessageSource<Req> + ?Sized,
        U: UpstreamCall<Req, Resp>,
        O: Future<Output = Result<U>>,
    {
        let mut backend = match self.ctx.run(open).await.and_then(|opened| opened) {
            Ok(backend) => backend,
            Err(err) => return (leg_failure(&err, StreamOutcome::BackendError), Err(err)),
        };

        loop {
            let message = match self.ctx.run(client.recv()).await {
                Ok(Ok(Some(message))) => message,
                Ok(Ok(None)) => {
                    return match self.ctx.run(backend.close_and_recv()).await {
                        Ok(Ok(reply)) => (Some(StreamOutcome::ClientEof), Ok(reply)),
                        Ok(Err(status)) => (
                            Some(StreamOutcome::BackendError),
                            Err(RegistryError::Backend(status)),
                        ),
                        Err(err) => (None, Err(err)),
                    };
                }
                Ok(Err(status)) => {
                    return (
                        Some(StreamOutcome::ClientError),
                        Err(RegistryError::ReceiveFailed {
                            artifact: self.artifact,
                            source: status,
                        }),
                    );
                }
                Err(err) => return (None, Err(err)),
            };

            match self.ctx.run(backend.send(message)).await {
                Ok(Ok(())) => self.record_message(),
                Ok(Err(SinkError::Closed)) => {
                    return match self.ctx.run(backend.close_send()).await {
                        Ok(()) => (Some(StreamOutcome::BackendEof), Ok(early_close_reply)),
                        Err(err) => (None, Err(err)),
                    };
                }
                Ok(Err(SinkError::Transport(status))) => {
                    return (
                        Some(StreamOutcome::BackendError),
                        Err(RegistryError::Backend(status)),
                    );
                }
                Err(err) => return (None, Err(err)),
            }
        }
    }

    async fn pump_downstream<T, D, K, O>(
        &mut self,
        open: O,
        client: &mut K,
    ) -> (Option<StreamOutcome>, Result<()>)
    where
        T: Send,
        D: DownstreamCall<T>,
        K: MessageSink<T> + ?Sized,
        O: Future<Output = Result<D>>,
    {
        let mut backend = match self.ctx.run(open).await.and_then(|opened| opened) {
            Ok(backend) => backend,
            Err(err) => return (leg_failure(&err, StreamOutcome::BackendError), Err(err)),
        };

        loop {
            let message = match self.ctx.run(backend.recv()).await {
                Ok(Ok(Some(message))) => message,
                Ok(Ok(None)) => return (Some(StreamOutcome::BackendEof), Ok(())),
                Ok(Err(status)) => {
                    return (
                        Some(StreamOutcome::BackendError),
                        Err(RegistryError::Backend(status)),
                    );
                }
                Err(err) => return (None, Err(err)),
            };

            match self.ctx.run(client.send(message)).await {
                Ok(Ok(())) => self.record_message(),
                Ok(Err(source)) => {
                    // Half-close so the backend stops producing
                    if let Err(err) = self.ctx.run(backend.close_send()).await {
                        return (None, Err(err));
                    }
                    return (
                        Some(StreamOutcome::ClientError),
                        Err(RegistryError::ForwardFailed {
                            artifact: self.artifact,
                            source,
                        }),
                    );
                }
                Err(err) => return (None, Err(err)),
            }
        }
    }

    fn record_message(&mut self) {
        self.progress.messages += 1;
        self.observer.on_progress(&self.info, self.progress);
    }
}

fn leg_failure(err: &RegistryError, outcome: StreamOutcome) -> Option<StreamOutcome> {
    if err.is_cancellation() {
        None
    } else {
        Some(outcome)
    }
}

/// Relay a client stream into a backend call, see [`Bridge::forward_client_stream`]
pub async fn forward_client_stream<Req, Resp, C, U, O>(
    ctx: &CallContext,
    observer: &dyn CallObserver,
    operation: &'static str,
    artifact: Artifact,
    client: &mut C,
    open: O,
    early_close_reply: Resp,
) -> Result<Resp>
where
    Req: Send,
    Resp: Send,
    C: MessageSource<Req> + ?Sized,
    U: UpstreamCall<Req, Resp>,
    O: Future<Output = Result<U>>,
{
    Bridge::new(ctx, observer, operation, artifact)
        .forward_client_stream(client, open, early_close_reply)
        .await
}

/// Relay a backend stream to the client, see [`Bridge::forward_server_stream`]
pub async fn forward_server_stream<T, D, K, O>(
    ctx: &CallContext,
    observer: &dyn CallObserver,
    operation: &'static str,
    artifact: Artifact,
    open: O,
    client: &mut K,
) -> Result<()>
where
    T: Send,
    D: DownstreamCall<T>,
    K: MessageSink<T> + ?Sized,
    O: Future<Output = Result<D>>,
{
    Bridge::new(ctx, observer, operation, artifact)
        .forward_server_stream(open, client)
        .await
}
