//! Serve-many: reuse one sandbox for a sequence of requests.
//!
//! Requests are dispatched strictly one at a time. Between dispatches the
//! scheduler checks the session limits; the first one reached retires the
//! sandbox. `max_lifetime` is only consulted at dispatch boundaries, so a
//! handler that is already running always completes.

use std::sync::Arc;

use anyhow::Context as _;
use edgekit_core::transport::Transport;
use edgekit_core::{
    Context, EdgekitConfig, Error, Result, RetireReason, SandboxEnvironment, SandboxSession,
    ServeManyOptions,
};
use edgekit_http::SandboxMeta;
use tracing::{debug, error, info, warn};

use crate::handler::{Handler, Outcome, dispatch};
use crate::serve::reject_oversized_headers;

/// What a finished serve-many loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    pub requests_served: u64,
    pub reason: RetireReason,
}

/// Serve-many scheduler for one sandbox instantiation.
pub struct ServeMany {
    transport: Arc<dyn Transport>,
    env: SandboxEnvironment,
    options: ServeManyOptions,
}

impl ServeMany {
    pub fn new(
        transport: Arc<dyn Transport>,
        env: SandboxEnvironment,
        options: ServeManyOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            transport,
            env,
            options,
        })
    }

    /// Limits and environment from an `edgekit.toml`. Variables in its
    /// `[env]` table override the process environment.
    pub fn from_config(transport: Arc<dyn Transport>, config: &EdgekitConfig) -> anyhow::Result<Self> {
        let options = config.serve_many_options()?;
        let mut env = SandboxEnvironment::from_process_env();
        if let Some(vars) = &config.env {
            env.extend(vars.clone());
        }
        Self::new(transport, env, options).context("invalid serve-many options")
    }

    pub fn options(&self) -> &ServeManyOptions {
        &self.options
    }

    pub fn env(&self) -> &SandboxEnvironment {
        &self.env
    }

    /// Dispatch requests until a limit is reached, the platform runs dry, or
    /// `ctx` is cancelled.
    ///
    /// A panicking handler, or a response that cannot be finalized, gets a
    /// 500 and is logged; the loop carries on with the next request.
    /// Failures to receive a request end the loop with an error.
    pub async fn run<H: Handler>(&self, ctx: &Context, handler: H) -> Result<ServeSummary> {
        let mut session = SandboxSession::new(self.options.clone());
        let root = ctx
            .child()
            .with_transport(self.transport.clone())
            .with_session(session.control());

        info!(
            sandbox_id = %self.env.sandbox_id(),
            max_requests = self.options.max_requests,
            next_timeout_ms = self.options.next_timeout.as_millis() as u64,
            max_lifetime_ms = self.options.max_lifetime.as_millis() as u64,
            "serve-many started"
        );

        let reason = loop {
            if let Some(reason) = session.retire_reason() {
                break reason;
            }

            let (wait, on_timeout) = session.next_wait();
            let next = root
                .run(tokio::time::timeout(wait, self.transport.next_request()))
                .await;
            let inbound = match next {
                Err(_) => break RetireReason::Cancelled,
                Ok(Err(_elapsed)) => break on_timeout,
                Ok(Ok(Ok(Some(inbound)))) => inbound,
                Ok(Ok(Ok(None))) => break RetireReason::NoMoreRequests,
                Ok(Ok(Err(Error::HeadersTooLarge))) => {
                    reject_oversized_headers(&self.transport)?;
                    session.record_dispatch();
                    continue;
                }
                Ok(Ok(Err(err))) => {
                    error!(error = %err, "failed to receive inbound request");
                    return Err(err);
                }
            };

            let meta = SandboxMeta {
                sandbox_id: self.env.sandbox_id().to_string(),
                request_id: inbound.request_id.clone(),
                sandbox_requests: session.requests_served(),
            };
            let request_id = meta.request_id.clone();
            debug!(%request_id, sandbox_requests = meta.sandbox_requests, "dispatching request");

            match dispatch(&handler, &root, &self.transport, inbound, meta).await {
                Ok(Outcome::Completed) => {}
                Ok(Outcome::Panicked(message)) => {
                    warn!(%request_id, panic = %message, "continuing after handler panic");
                }
                Ok(Outcome::Failed(err)) => {
                    warn!(%request_id, error = %err, "continuing after failed dispatch");
                }
                Err(err) => {
                    error!(%request_id, error = %err, "dispatch failed");
                    return Err(err);
                }
            }
            session.record_dispatch();
        };

        root.cancel();
        info!(
            sandbox_id = %self.env.sandbox_id(),
            requests_served = session.requests_served(),
            ?reason,
            elapsed_ms = session.elapsed().as_millis() as u64,
            "sandbox retired"
        );

        Ok(ServeSummary {
            requests_served: session.requests_served(),
            reason,
        })
    }
}

impl std::fmt::Debug for ServeMany {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServeMany")
            .field("sandbox_id", &self.env.sandbox_id())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::MemoryTransport;
    use std::time::Duration;

    fn options(max_requests: u64) -> ServeManyOptions {
        ServeManyOptions {
            next_timeout: Duration::from_millis(100),
            max_requests,
            max_lifetime: Duration::from_secs(5),
        }
    }

    #[test]
    fn zero_limits_rejected() {
        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new());
        let err = ServeMany::new(transport, SandboxEnvironment::new(), options(0)).unwrap_err();
        assert_eq!(err.kind(), edgekit_core::ErrorKind::InvalidArgument);
    }

    #[test]
    fn config_env_overrides_process_env() {
        let config = EdgekitConfig::from_str(
            r#"
            [serve_many]
            max_requests = 7
            next_timeout = "250ms"

            [env]
            FASTLY_TRACE_ID = "sandbox-42"
            "#,
        )
        .unwrap();
        let serve_many = ServeMany::from_config(Arc::new(MemoryTransport::new()), &config).unwrap();
        assert_eq!(serve_many.options().max_requests, 7);
        assert_eq!(serve_many.options().next_timeout, Duration::from_millis(250));
        assert_eq!(serve_many.env().sandbox_id(), "sandbox-42");
    }
}
