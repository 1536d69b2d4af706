//! Request handlers and the per-request dispatch shared by serve-once and
//! serve-many.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use edgekit_core::transport::{BodyHandle, DownstreamRequest, Transport};
use edgekit_core::{BoxFuture, Context, Error, Result};
use edgekit_http::{Request, ResponseWriter, SandboxMeta, StatusCode};
use futures_util::FutureExt;
use tracing::{error, warn};

/// Application code that answers one request.
///
/// The handler writes its response through `w`; whatever it leaves unsent
/// is flushed and closed after it returns. `ctx` is cancelled once the
/// dispatch ends, so work spawned under it does not outlive the request.
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(&'a self, ctx: Context, w: &'a mut ResponseWriter, req: Request) -> BoxFuture<'a, ()>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve<'a>(&'a self, ctx: Context, w: &'a mut ResponseWriter, req: Request) -> BoxFuture<'a, ()> {
        (**self).serve(ctx, w, req)
    }
}

/// Adapter returned by [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Build a [`Handler`] from a closure returning a boxed future:
///
/// ```ignore
/// let handler = handler_fn(|_ctx, w, _req| Box::pin(async move {
///     let _ = w.write_all(b"hello");
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter, Request) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter, Request) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn serve<'a>(&'a self, ctx: Context, w: &'a mut ResponseWriter, req: Request) -> BoxFuture<'a, ()> {
        (self.0)(ctx, w, req)
    }
}

/// How a single dispatch ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    Panicked(String),
    /// The response could not be finalized. The client got a 500 if no
    /// headers had gone out yet.
    Failed(Error),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn release_inbound(transport: &Arc<dyn Transport>, body: BodyHandle, request_id: &str) {
    if let Err(err) = transport.abandon_body(body) {
        warn!(%request_id, error = %err, "failed to release request body");
    }
}

/// Best-effort 500, or just close the response if headers already went out.
fn fail_response(w: &mut ResponseWriter, request_id: &str) {
    let finalized = if w.headers_sent() {
        w.close()
    } else {
        w.send_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };
    if let Err(err) = finalized {
        warn!(%request_id, error = %err, "failed to send error response");
    }
}

/// Run `handler` for one inbound request and finalize the response. The
/// inbound body is released once the dispatch ends.
pub(crate) async fn dispatch<H: Handler + ?Sized>(
    handler: &H,
    ctx: &Context,
    transport: &Arc<dyn Transport>,
    inbound: DownstreamRequest,
    meta: SandboxMeta,
) -> Result<Outcome> {
    let request_id = meta.request_id.clone();
    let inbound_body = inbound.body;
    let mut w = ResponseWriter::new(transport.clone())?;

    let req = match Request::from_downstream(transport.clone(), inbound, Some(meta)) {
        Ok(req) => req,
        Err(err) => {
            warn!(%request_id, error = %err, "rejecting malformed request");
            release_inbound(transport, inbound_body, &request_id);
            if let Err(err) = w.send_error(StatusCode::BAD_REQUEST, "Bad Request") {
                warn!(%request_id, error = %err, "failed to send error response");
                return Ok(Outcome::Failed(err));
            }
            return Ok(Outcome::Completed);
        }
    };

    let dispatch_ctx = ctx.child();
    let result = AssertUnwindSafe(handler.serve(dispatch_ctx.clone(), &mut w, req))
        .catch_unwind()
        .await;
    dispatch_ctx.cancel();

    let outcome = match result {
        Ok(()) => match w.close() {
            Ok(()) => Outcome::Completed,
            Err(err) => {
                warn!(%request_id, error = %err, "failed to finalize response");
                fail_response(&mut w, &request_id);
                Outcome::Failed(err)
            }
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%request_id, panic = %message, "handler panicked");
            fail_response(&mut w, &request_id);
            Outcome::Panicked(message)
        }
    };
    release_inbound(transport, inbound_body, &request_id);
    Ok(outcome)
}
