//! Per-call cancellation and deadline propagation.
//!
//! A [`Context`] is threaded through every suspending call (`send`, body
//! reads, waiting for the next inbound request). It combines a
//! cancellation token, an optional deadline, and the handles a dispatch
//! needs to reach the platform: the [`Transport`] and, under serve-many,
//! the [`SessionControl`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::session::SessionControl;
use crate::transport::Transport;

#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    transport: Option<Arc<dyn Transport>>,
    session: Option<SessionControl>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            transport: None,
            session: None,
        }
    }

    /// Bind the platform transport used by sends and bodies created under
    /// this context.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_session(mut self, session: SessionControl) -> Self {
        self.session = Some(session);
        self
    }

    /// Derive a context that is cancelled when `self` is, and can also be
    /// cancelled on its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            transport: self.transport.clone(),
            session: self.session.clone(),
        }
    }

    /// Child context whose deadline is `timeout` from now, or the parent's
    /// deadline if that is sooner.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, at: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(existing) if existing < at => existing,
            _ => at,
        });
        child
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error a suspending call would fail with right now, if any.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(at) if at <= Instant::now() => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn transport(&self) -> Result<&Arc<dyn Transport>> {
        self.transport
            .as_ref()
            .ok_or_else(|| Error::transport("no transport bound to context"))
    }

    /// Session control, present only inside a serve-many dispatch.
    pub fn session(&self) -> Option<&SessionControl> {
        self.session.as_ref()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        let deadline = async {
            match self.deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Error::Cancelled,
            _ = deadline => Error::DeadlineExceeded,
        }
    }

    /// Drive `fut` until it completes or the context is done, whichever
    /// happens first. On cancellation the future is dropped.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("has_transport", &self.transport.is_some())
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn run_completes_before_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let out = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                7
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn run_fails_with_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let start = Instant::now();
        let err = ctx
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = Context::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        let err = child.run(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_alone() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_earlier_parent_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(20));
        let child = parent.with_timeout(Duration::from_secs(5));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn transport_is_required_for_platform_calls() {
        let err = Context::background().transport().err().unwrap();
        assert!(matches!(err, Error::Transport(_)));
    }
}
