//! Serve-once: one sandbox, one request.

use std::sync::Arc;

use edgekit_core::transport::Transport;
use edgekit_core::{Context, Error, Result, SandboxEnvironment};
use edgekit_http::{ResponseWriter, SandboxMeta, StatusCode};
use tracing::{debug, warn};

use crate::handler::{Handler, Outcome, dispatch};

/// Answer a request whose header section the platform refused to deliver.
pub(crate) fn reject_oversized_headers(transport: &Arc<dyn Transport>) -> Result<()> {
    warn!("inbound header section too large");
    let mut w = ResponseWriter::new(transport.clone())?;
    w.send_error(
        StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        "Request Header Fields Too Large",
    )
}

/// Receive a single request, run `handler` for it, and finalize the
/// response.
///
/// Returns `Ok(())` when the platform has nothing to deliver. A panicking
/// handler still produces a 500 for the client, then surfaces here as
/// [`Error::HandlerPanicked`]. A response that cannot be finalized is
/// likewise answered with a 500 and its error returned.
pub async fn serve<H: Handler>(
    transport: Arc<dyn Transport>,
    env: &SandboxEnvironment,
    handler: H,
) -> Result<()> {
    let inbound = match transport.next_request().await {
        Ok(Some(inbound)) => inbound,
        Ok(None) => {
            debug!("no inbound request to serve");
            return Ok(());
        }
        Err(Error::HeadersTooLarge) => return reject_oversized_headers(&transport),
        Err(err) => return Err(err),
    };

    let meta = SandboxMeta {
        sandbox_id: env.sandbox_id().to_string(),
        request_id: inbound.request_id.clone(),
        sandbox_requests: 0,
    };
    let ctx = Context::background().with_transport(transport.clone());
    match dispatch(&handler, &ctx, &transport, inbound, meta).await? {
        Outcome::Completed => Ok(()),
        Outcome::Panicked(message) => Err(Error::HandlerPanicked(message)),
        Outcome::Failed(err) => Err(err),
    }
}
