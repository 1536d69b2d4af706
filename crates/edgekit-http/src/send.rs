//! Outbound send protocol.
//!
//! A request moves `Built -> Sending -> Completed | Failed`. The request is
//! framed, its body staged on a platform body handle, and the transport is
//! awaited under the caller's [`Context`]. Nothing here retries.
//!
//! A streaming body is copied by a background task while the request is in
//! flight. If that copy fails, the body is abandoned rather than closed, so
//! the backend never sees a truncated body as complete, and the send fails
//! with the copy's error.

use std::sync::Arc;

use edgekit_core::transport::{BodyHandle, Transport, UpstreamRequest};
use edgekit_core::{Context, Error, Result, SendErrorKind};
use futures_util::StreamExt;
use http::StatusCode;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::body::{Body, BodyMode, ByteStream, RequestBody, RequestBodyKind};
use crate::header::HeaderMap;
use crate::request::{parse_version, FramingMode, Request};
use crate::response::Response;

const FRAMING_HEADERS: [&str; 2] = ["Content-Length", "Transfer-Encoding"];

fn upload_stopped() -> Error {
    Error::transport("request body upload stopped")
}

/// Result of copying a streaming request body to the platform. An error is
/// reported once.
#[derive(Debug)]
pub(crate) struct Upload {
    done: Option<oneshot::Receiver<Result<()>>>,
}

impl Upload {
    /// Resolves with the copy's error. Never resolves if the copy succeeds.
    async fn failure(&mut self) -> Error {
        if let Some(done) = self.done.as_mut() {
            let result = done.await;
            self.done = None;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return err,
                Err(_) => return upload_stopped(),
            }
        }
        std::future::pending().await
    }

    /// The copy's error, if it has already failed.
    pub(crate) fn try_error(&mut self) -> Option<Error> {
        let done = self.done.as_mut()?;
        match done.try_recv() {
            Ok(result) => {
                self.done = None;
                result.err()
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                self.done = None;
                Some(upload_stopped())
            }
        }
    }

    /// Wait for the copy to finish.
    pub(crate) async fn wait(&mut self) -> Result<()> {
        match self.done.take() {
            Some(done) => done.await.unwrap_or_else(|_| Err(upload_stopped())),
            None => Ok(()),
        }
    }
}

/// Copies a streaming request body onto its platform handle while the
/// request is in flight.
struct BodyCopy {
    task: JoinHandle<()>,
    upload: Upload,
}

impl BodyCopy {
    fn spawn(transport: Arc<dyn Transport>, handle: BodyHandle, mut stream: ByteStream) -> Self {
        let (tx, done) = oneshot::channel();
        let task = tokio::spawn(async move {
            let copied = async {
                while let Some(chunk) = stream.next().await {
                    write_buffered(&transport, handle, &chunk?)?;
                }
                Ok::<_, Error>(())
            }
            .await;

            let result = match copied {
                Ok(()) => transport.close_body(handle),
                Err(err) => {
                    debug!(%handle, error = %err, "streaming request body failed");
                    release(&transport, handle);
                    Err(err)
                }
            };
            let _ = tx.send(result);
        });
        Self {
            task,
            upload: Upload { done: Some(done) },
        }
    }
}

/// Abandon a body this send created.
fn release(transport: &Arc<dyn Transport>, handle: BodyHandle) {
    if let Err(err) = transport.abandon_body(handle) {
        debug!(%handle, error = %err, "failed to release request body");
    }
}

struct Staged {
    handle: BodyHandle,
    streaming: bool,
    /// The handle was created for this send rather than passed through.
    owned: bool,
    copy: Option<BodyCopy>,
}

/// Put the body on a platform handle. On failure the body comes back
/// untouched.
fn stage_body(
    transport: &Arc<dyn Transport>,
    body: RequestBodyKind,
) -> std::result::Result<Staged, (Error, RequestBodyKind)> {
    match body {
        RequestBodyKind::Buffered(bytes) => {
            let handle = match transport.new_body() {
                Ok(handle) => handle,
                Err(err) => return Err((err, RequestBodyKind::Buffered(bytes))),
            };
            let written = write_buffered(transport, handle, &bytes).and_then(|()| transport.close_body(handle));
            if let Err(err) = written {
                release(transport, handle);
                return Err((err, RequestBodyKind::Buffered(bytes)));
            }
            Ok(Staged {
                handle,
                streaming: false,
                owned: true,
                copy: None,
            })
        }
        RequestBodyKind::Platform(mut body) => {
            if !body.has_pending() {
                return Ok(Staged {
                    handle: body.handle(),
                    streaming: false,
                    owned: false,
                    copy: None,
                });
            }
            let handle = match transport.new_body() {
                Ok(handle) => handle,
                Err(err) => return Err((err, RequestBodyKind::Platform(body))),
            };
            // Part of the body was already read out; resend that part first.
            let pending = body.take_pending();
            let stream = futures_util::stream::once(async move { Ok::<_, Error>(pending) })
                .chain(body.into_stream());
            Ok(stage_stream(transport, handle, Box::pin(stream)))
        }
        RequestBodyKind::Stream(stream) => match transport.new_body() {
            Ok(handle) => Ok(stage_stream(transport, handle, stream)),
            Err(err) => Err((err, RequestBodyKind::Stream(stream))),
        },
    }
}

fn stage_stream(transport: &Arc<dyn Transport>, handle: BodyHandle, stream: ByteStream) -> Staged {
    Staged {
        handle,
        streaming: true,
        owned: true,
        copy: Some(BodyCopy::spawn(transport.clone(), handle, stream)),
    }
}

fn write_buffered(transport: &Arc<dyn Transport>, handle: BodyHandle, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        let n = transport.write_body(handle, bytes)?;
        if n == 0 {
            return Err(Error::transport(format!("{handle} accepted no bytes")));
        }
        bytes = &bytes[n..];
    }
    Ok(())
}

fn wire_headers(request: &Request) -> HeaderMap {
    let mut headers = request.headers().clone();
    if request.framing() == FramingMode::Automatic {
        for name in FRAMING_HEADERS {
            headers.delete(name);
        }
    }
    headers
}

pub(crate) async fn send(ctx: &Context, request: &mut Request, backend: &str) -> Result<Response> {
    if backend.is_empty() {
        return Err(Error::invalid_argument("backend name is empty"));
    }
    if request.is_sent() {
        return Err(Error::AlreadySent);
    }
    let uri = request.uri().clone();
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(Error::InvalidUrl {
            url: uri.to_string(),
            reason: "URL must include a scheme and host".to_string(),
        });
    }
    if let Some(err) = ctx.err() {
        return Err(err);
    }
    let transport = ctx.transport()?.clone();

    let headers = wire_headers(request);
    let Staged {
        handle,
        streaming,
        owned,
        mut copy,
    } = match stage_body(&transport, request.take_body().into_kind()) {
        Ok(staged) => staged,
        Err((err, body)) => {
            request.set_body(RequestBody::from(body));
            warn!(backend, error = %err, "failed to stage request body");
            return Err(err);
        }
    };

    let upstream = UpstreamRequest {
        method: request.method().to_string(),
        uri: uri.to_string(),
        headers: headers.to_wire(),
        body: handle,
        cache: request.cache_options().to_override(),
        manual_framing: request.framing() == FramingMode::Manual,
        streaming,
    };
    request.mark_sent();

    debug!(backend, method = %upstream.method, uri = %upstream.uri, streaming, "sending request");
    let exchange = async {
        match copy.as_mut() {
            Some(copy) => tokio::select! {
                biased;
                err = copy.upload.failure() => Err(err),
                sent = transport.send(backend, upstream) => sent,
            },
            None => transport.send(backend, upstream).await,
        }
    };
    let outcome = ctx.run(exchange).await.and_then(|inner| inner);

    let upstream = match outcome {
        Ok(upstream) => upstream,
        Err(err) => {
            let err = match copy {
                Some(mut copy) => {
                    let failed = copy.upload.try_error();
                    copy.task.abort();
                    failed.unwrap_or(err)
                }
                None => err,
            };
            if owned {
                release(&transport, handle);
            }
            warn!(backend, error = %err, "send failed");
            return Err(err);
        }
    };

    let mut upload = copy.map(|copy| copy.upload);
    if let Some(err) = upload.as_mut().and_then(Upload::try_error) {
        warn!(backend, error = %err, "request body upload failed");
        return Err(err);
    }

    let status = StatusCode::from_u16(upstream.status).map_err(|_| Error::Send {
        backend: backend.to_string(),
        detail: SendErrorKind::HttpResponseStatusInvalid,
    })?;
    debug!(backend, status = status.as_u16(), "response headers received");

    let body = Body::from_handle(transport, upstream.body, BodyMode::Read);
    Ok(Response::new(
        status,
        parse_version(&upstream.protocol),
        HeaderMap::from_wire(upstream.headers),
        body,
        backend.to_string(),
        upstream.remote_addr,
        upload,
    ))
}
