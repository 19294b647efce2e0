//! REST handlers: the module and provider registry protocols consumed by
//! Terraform, and the publishing API

pub mod modules;
pub mod providers;
pub mod publish;
pub mod service;

pub use modules::*;
pub use providers::*;
pub use service::*;

use crate::middleware::RequestId;
use crate::ApiError;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use canopy_core::{CallContext, ChannelSink, MessageSource, StreamSource};
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::debug;

/// Receiving end of a download relayed to an HTTP response
pub(crate) type DownloadSource<T> = StreamSource<ReceiverStream<Result<T, Status>>>;

pub(crate) fn call_context(request_id: RequestId) -> CallContext {
    CallContext::new().with_request_id(request_id.0)
}

/// Deliver the outcome of a download task to the response stream
pub(crate) async fn finish_download<T: Send>(
    sink: &mut ChannelSink<T>,
    result: canopy_core::Result<()>,
) {
    if let Err(err) = result {
        if sink.send_error(Status::from(err)).await.is_err() {
            debug!("download failed after the client went away");
        }
    }
}

/// Stream a download as the response body, chunk by chunk.
///
/// A failure before the first chunk becomes an error response; a failure
/// after it aborts the body. Dropping the body cancels the download.
pub(crate) async fn streamed_response<T>(
    ctx: &CallContext,
    mut source: DownloadSource<T>,
    content_type: &'static str,
    chunk: fn(T) -> Bytes,
) -> Result<Response, ApiError>
where
    T: Send + 'static,
{
    let first = source.recv().await?;

    let guard = ctx.cancellation_token().clone().drop_guard();
    let head = first.map(|msg| Ok::<_, Status>(chunk(msg)));
    let rest = source.into_inner().map(move |item| {
        let _ = &guard;
        item.map(chunk)
    });
    let body = futures::stream::iter(head).chain(rest);

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, content_type)],
        Body::from_stream(body),
    )
        .into_response())
}
