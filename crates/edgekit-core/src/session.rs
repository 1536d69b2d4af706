//! Serve-many session bookkeeping.
//!
//! A [`SandboxSession`] lives for one sandbox instantiation. It counts
//! dispatches, remembers when the sandbox started, and decides when the
//! sandbox should retire. Handlers reach the live limits through a
//! [`SessionControl`] carried on their [`Context`](crate::Context).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ServeManyOptions;

/// Why a serve-many loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    /// `max_requests` dispatches completed.
    MaxRequests,
    /// The sandbox reached `max_lifetime`.
    MaxLifetime,
    /// No request arrived within `next_timeout`.
    NextTimeout,
    /// The platform reported it will deliver no more requests.
    NoMoreRequests,
    /// A handler asked for the session to end after its dispatch.
    Requested,
    /// The scheduler's context was cancelled.
    Cancelled,
}

#[derive(Debug, Default)]
struct Overrides {
    max_requests: Option<u64>,
    retire: bool,
}

/// Handler-facing view of the live session limits.
///
/// Limits can only be tightened: a handler may lower `max_requests` or ask
/// the session to retire once the current dispatch finishes.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    overrides: Arc<Mutex<Overrides>>,
}

impl SessionControl {
    fn lock(&self) -> MutexGuard<'_, Overrides> {
        self.overrides.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_max_requests(&self, max_requests: u64) {
        let mut overrides = self.lock();
        overrides.max_requests = Some(match overrides.max_requests {
            Some(current) => current.min(max_requests),
            None => max_requests,
        });
    }

    /// Retire the sandbox after the current dispatch.
    pub fn retire(&self) {
        self.lock().retire = true;
    }

    pub fn retire_requested(&self) -> bool {
        self.lock().retire
    }

    fn max_requests_override(&self) -> Option<u64> {
        self.lock().max_requests
    }
}

/// Counters and limits for one sandbox's serve-many lifetime.
#[derive(Debug)]
pub struct SandboxSession {
    options: ServeManyOptions,
    started: Instant,
    requests_served: u64,
    control: SessionControl,
}

impl SandboxSession {
    pub fn new(options: ServeManyOptions) -> Self {
        Self {
            options,
            started: Instant::now(),
            requests_served: 0,
            control: SessionControl::default(),
        }
    }

    pub fn options(&self) -> &ServeManyOptions {
        &self.options
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record_dispatch(&mut self) {
        self.requests_served += 1;
    }

    /// Effective request ceiling, including any handler override.
    pub fn max_requests(&self) -> u64 {
        match self.control.max_requests_override() {
            Some(limit) => limit.min(self.options.max_requests),
            None => self.options.max_requests,
        }
    }

    /// Checked at dispatch boundaries only; a running handler is never
    /// interrupted.
    pub fn retire_reason(&self) -> Option<RetireReason> {
        if self.control.retire_requested() {
            return Some(RetireReason::Requested);
        }
        if self.requests_served >= self.max_requests() {
            return Some(RetireReason::MaxRequests);
        }
        if self.elapsed() >= self.options.max_lifetime {
            return Some(RetireReason::MaxLifetime);
        }
        None
    }

    /// How long to wait for the next request, and what to report if that
    /// wait runs out. The wait never extends past `max_lifetime`.
    pub fn next_wait(&self) -> (Duration, RetireReason) {
        let remaining = self.options.max_lifetime.saturating_sub(self.elapsed());
        if remaining < self.options.next_timeout {
            (remaining, RetireReason::MaxLifetime)
        } else {
            (self.options.next_timeout, RetireReason::NextTimeout)
        }
    }
}
