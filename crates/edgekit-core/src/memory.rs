//! In-memory platform for tests and local runs.
//!
//! [`MemoryTransport`] implements [`Transport`] without a host: inbound
//! requests are queued by the test, backends are async closures, bodies
//! are in-memory pipes that wake readers as bytes arrive, and everything
//! the SDK emits (client responses, backend requests, log events) is
//! recorded for inspection.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{
    BodyHandle, CacheOverride, Collaborator, DownstreamRequest, ResponseHead, Transport,
    UpstreamRequest, UpstreamResponse, WireHeader,
};
use crate::BoxFuture;

type BackendFn = Arc<dyn Fn(BackendRequest) -> BoxFuture<'static, Result<BackendResponse>> + Send + Sync>;

/// A request as received by an in-memory backend, body fully buffered.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub backend: String,
    pub method: String,
    pub uri: String,
    pub headers: Vec<WireHeader>,
    pub body: Bytes,
    pub cache: CacheOverride,
    pub manual_framing: bool,
    pub streaming: bool,
}

impl BackendRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// What an in-memory backend answers with.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: u16,
    pub headers: Vec<WireHeader>,
    pub body: Bytes,
}

impl BackendResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(WireHeader::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// An inbound request to enqueue with [`MemoryTransport::push_request`].
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<WireHeader>,
    pub body: Bytes,
    pub client_addr: Option<IpAddr>,
}

impl InboundRequest {
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            client_addr: Some(IpAddr::from([127, 0, 0, 1])),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(WireHeader::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A completed client response.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub status: u16,
    pub headers: Vec<WireHeader>,
    pub body: Bytes,
    pub manual_framing: bool,
    pub streaming: bool,
}

impl RecordedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }
}

#[derive(Default)]
struct Pipe {
    data: BytesMut,
    closed: bool,
}

struct PendingDownstream {
    head: ResponseHead,
    streaming: bool,
}

#[derive(Default)]
struct State {
    next_handle: u32,
    next_request_id: u64,
    bodies: HashMap<BodyHandle, Pipe>,
    downstream: HashMap<BodyHandle, PendingDownstream>,
    responses: Vec<RecordedResponse>,
    sent: Vec<BackendRequest>,
    logs: Vec<(String, Bytes)>,
    stores: HashMap<Collaborator, HashMap<String, Bytes>>,
    in_flight_sends: usize,
    max_open_bodies: Option<usize>,
}

impl State {
    fn alloc_body(&mut self, data: Bytes, closed: bool) -> BodyHandle {
        self.next_handle += 1;
        let handle = BodyHandle::from_raw(self.next_handle);
        self.bodies.insert(
            handle,
            Pipe {
                data: BytesMut::from(&data[..]),
                closed,
            },
        );
        handle
    }

    fn issued(&self, body: BodyHandle) -> bool {
        (1..=self.next_handle).contains(&body.as_raw())
    }

    fn pipe(&mut self, body: BodyHandle) -> Result<&mut Pipe> {
        let issued = self.issued(body);
        self.bodies.get_mut(&body).ok_or_else(|| {
            if issued {
                Error::transport(format!("{body} was released"))
            } else {
                Error::invalid_argument(format!("unknown {body}"))
            }
        })
    }
}

struct Inner {
    state: Mutex<State>,
    body_ready: Notify,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<InboundRequest>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundRequest>>,
    backends: RwLock<HashMap<String, BackendFn>>,
    max_pending_sends: Option<usize>,
    max_header_bytes: Option<usize>,
}

/// In-memory [`Transport`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_limits(None, None)
    }

    /// A transport that refuses sends beyond `max_pending_sends` in flight
    /// and inbound requests whose header section exceeds
    /// `max_header_bytes`.
    pub fn with_limits(max_pending_sends: Option<usize>, max_header_bytes: Option<usize>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                body_ready: Notify::new(),
                inbound_tx: Mutex::new(Some(tx)),
                inbound_rx: tokio::sync::Mutex::new(rx),
                backends: RwLock::new(HashMap::new()),
                max_pending_sends,
                max_header_bytes,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a named backend.
    pub fn backend<F, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(BackendRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BackendResponse>> + Send + 'static,
    {
        let handler: BackendFn = Arc::new(move |req| Box::pin(handler(req)));
        self.inner
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), handler);
        self
    }

    /// Seed a collaborator with entries. Registering makes it openable.
    pub fn store<I, K, V>(&self, collaborator: Collaborator, entries: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let mut state = self.state();
        let store = state.stores.entry(collaborator).or_default();
        for (k, v) in entries {
            store.insert(k.into(), v.into());
        }
        self
    }

    /// Enqueue an inbound client request.
    pub fn push_request(&self, request: InboundRequest) {
        let tx = self.inner.inbound_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            // The receiver lives as long as `inner`, so this cannot fail.
            let _ = tx.send(request);
        }
    }

    /// Stop delivering requests; `next_request` yields `None` once the
    /// queue drains.
    pub fn close_inbound(&self) {
        self.inner
            .inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Client responses whose bodies have been closed, in completion order.
    pub fn responses(&self) -> Vec<RecordedResponse> {
        self.state().responses.clone()
    }

    /// Requests that reached a backend, in arrival order.
    pub fn sent_requests(&self) -> Vec<BackendRequest> {
        self.state().sent.clone()
    }

    /// Log events as `(endpoint, message)` pairs.
    pub fn logs(&self) -> Vec<(String, Bytes)> {
        self.state().logs.clone()
    }

    pub fn in_flight_sends(&self) -> usize {
        self.state().in_flight_sends
    }

    /// Number of body handles not yet closed.
    pub fn open_bodies(&self) -> usize {
        self.state().bodies.values().filter(|p| !p.closed).count()
    }

    /// Number of body handles not yet released. A closed body is released
    /// once a reader drains it, once it completes a client response, or
    /// when it is abandoned.
    pub fn live_bodies(&self) -> usize {
        self.state().bodies.len()
    }

    /// Refuse `new_body` while `max` bodies are open. `None` lifts the
    /// limit.
    pub fn set_max_open_bodies(&self, max: Option<usize>) {
        self.state().max_open_bodies = max;
    }

    async fn read_to_end(&self, body: BodyHandle) -> Result<Bytes> {
        let mut out = BytesMut::new();
        loop {
            let chunk = self.read_body(body, usize::MAX).await?;
            if chunk.is_empty() {
                return Ok(out.freeze());
            }
            out.extend_from_slice(&chunk);
        }
    }

    fn acquire_send_slot(&self) -> Result<SendSlot> {
        let mut state = self.state();
        if let Some(max) = self.inner.max_pending_sends {
            if state.in_flight_sends >= max {
                return Err(Error::ResourceExhausted(format!(
                    "pending request limit of {max} reached"
                )));
            }
        }
        state.in_flight_sends += 1;
        Ok(SendSlot {
            transport: self.clone(),
        })
    }
}

/// Releases a send slot even when the send future is dropped mid-flight.
struct SendSlot {
    transport: MemoryTransport,
}

impl Drop for SendSlot {
    fn drop(&mut self) {
        let mut state = self.transport.state();
        state.in_flight_sends = state.in_flight_sends.saturating_sub(1);
    }
}

fn header_bytes(headers: &[WireHeader]) -> usize {
    headers.iter().map(|h| h.name.len() + h.value.len() + 4).sum()
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn next_request(&self) -> Result<Option<DownstreamRequest>> {
        let inbound = {
            let mut rx = self.inner.inbound_rx.lock().await;
            match rx.recv().await {
                Some(inbound) => inbound,
                None => return Ok(None),
            }
        };

        if let Some(limit) = self.inner.max_header_bytes {
            if header_bytes(&inbound.headers) > limit {
                return Err(Error::HeadersTooLarge);
            }
        }

        let mut state = self.state();
        state.next_request_id += 1;
        let request_id = format!("req-{:04}", state.next_request_id);
        let body = state.alloc_body(inbound.body, true);
        debug!(%request_id, method = %inbound.method, uri = %inbound.uri, "delivering inbound request");

        Ok(Some(DownstreamRequest {
            method: inbound.method,
            uri: inbound.uri,
            protocol: "HTTP/1.1".to_string(),
            headers: inbound.headers,
            body,
            client_addr: inbound.client_addr,
            server_addr: Some(IpAddr::from([127, 0, 0, 1])),
            request_id,
        }))
    }

    async fn send(&self, backend: &str, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let handler = self
            .inner
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(backend)
            .cloned()
            .ok_or_else(|| Error::BackendNotFound(backend.to_string()))?;

        let _slot = self.acquire_send_slot()?;
        let body = self.read_to_end(request.body).await?;

        let backend_request = BackendRequest {
            backend: backend.to_string(),
            method: request.method,
            uri: request.uri,
            headers: request.headers,
            body,
            cache: request.cache,
            manual_framing: request.manual_framing,
            streaming: request.streaming,
        };
        self.state().sent.push(backend_request.clone());

        let response = handler(backend_request).await?;
        let body = self.state().alloc_body(response.body, true);
        self.inner.body_ready.notify_waiters();

        Ok(UpstreamResponse {
            status: response.status,
            protocol: "HTTP/1.1".to_string(),
            headers: response.headers,
            body,
            remote_addr: None,
        })
    }

    fn new_body(&self) -> Result<BodyHandle> {
        let mut state = self.state();
        if let Some(max) = state.max_open_bodies {
            if state.bodies.values().filter(|p| !p.closed).count() >= max {
                return Err(Error::ResourceExhausted(format!(
                    "open body limit of {max} reached"
                )));
            }
        }
        Ok(state.alloc_body(Bytes::new(), false))
    }

    async fn read_body(&self, body: BodyHandle, max: usize) -> Result<Bytes> {
        loop {
            let notified = self.inner.body_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                let pipe = state.pipe(body)?;
                if !pipe.data.is_empty() {
                    let n = pipe.data.len().min(max);
                    return Ok(pipe.data.split_to(n).freeze());
                }
                if pipe.closed {
                    state.bodies.remove(&body);
                    return Ok(Bytes::new());
                }
            }

            notified.await;
        }
    }

    fn write_body(&self, body: BodyHandle, chunk: &[u8]) -> Result<usize> {
        {
            let mut state = self.state();
            let pipe = state.pipe(body)?;
            if pipe.closed {
                return Err(Error::StreamClosed);
            }
            pipe.data.extend_from_slice(chunk);
        }
        self.inner.body_ready.notify_waiters();
        Ok(chunk.len())
    }

    fn append_body(&self, dest: BodyHandle, src: BodyHandle) -> Result<()> {
        {
            let mut state = self.state();
            if state.pipe(dest)?.closed {
                return Err(Error::StreamClosed);
            }
            state.pipe(src)?;
            let moved = state.bodies.remove(&src).map(|p| p.data).unwrap_or_default();
            state.pipe(dest)?.data.extend_from_slice(&moved);
        }
        self.inner.body_ready.notify_waiters();
        Ok(())
    }

    fn close_body(&self, body: BodyHandle) -> Result<()> {
        {
            let mut state = self.state();
            let pipe = state.pipe(body)?;
            pipe.closed = true;
            if let Some(pending) = state.downstream.remove(&body) {
                let data = state.bodies.remove(&body).map(|p| p.data.freeze()).unwrap_or_default();
                state.responses.push(RecordedResponse {
                    status: pending.head.status,
                    headers: pending.head.headers,
                    body: data,
                    manual_framing: pending.head.manual_framing,
                    streaming: pending.streaming,
                });
            }
        }
        self.inner.body_ready.notify_waiters();
        Ok(())
    }

    fn abandon_body(&self, body: BodyHandle) -> Result<()> {
        {
            let mut state = self.state();
            if !state.issued(body) {
                return Err(Error::invalid_argument(format!("unknown {body}")));
            }
            state.bodies.remove(&body);
            state.downstream.remove(&body);
        }
        self.inner.body_ready.notify_waiters();
        Ok(())
    }

    fn send_downstream(&self, head: ResponseHead, body: BodyHandle, streaming: bool) -> Result<()> {
        if (100..200).contains(&head.status) && head.status != 103 {
            return Err(Error::InvalidStatusCode(head.status));
        }
        let mut state = self.state();
        state.pipe(body)?;
        if head.status == 103 {
            // Early hints are informational; the final response follows.
            return Ok(());
        }
        state
            .downstream
            .insert(body, PendingDownstream { head, streaming });
        Ok(())
    }

    fn open(&self, collaborator: &Collaborator) -> Result<()> {
        if *collaborator == Collaborator::Geo || self.state().stores.contains_key(collaborator) {
            Ok(())
        } else {
            Err(Error::StoreNotFound(collaborator.to_string()))
        }
    }

    fn lookup(&self, collaborator: &Collaborator, key: &str) -> Result<Bytes> {
        if key.is_empty() {
            return Err(Error::invalid_argument("empty key"));
        }
        if matches!(collaborator, Collaborator::Geo | Collaborator::Acl(_))
            && key.parse::<IpAddr>().is_err()
        {
            return Err(Error::invalid_argument(format!("invalid IP address {key:?}")));
        }

        let state = self.state();
        let entry = state.stores.get(collaborator).and_then(|s| s.get(key)).cloned();
        match (collaborator, entry) {
            (_, Some(value)) => Ok(value),
            (Collaborator::Geo, None) => Ok(Bytes::new()),
            (Collaborator::Acl(_), None) => Err(Error::NoContent),
            (_, None) if !state.stores.contains_key(collaborator) => {
                Err(Error::StoreNotFound(collaborator.to_string()))
            }
            (_, None) => Err(Error::NotFound(key.to_string())),
        }
    }

    fn insert(&self, collaborator: &Collaborator, key: &str, value: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("empty key"));
        }
        let mut state = self.state();
        let store = state
            .stores
            .get_mut(collaborator)
            .ok_or_else(|| Error::StoreNotFound(collaborator.to_string()))?;
        store.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, collaborator: &Collaborator, key: &str) -> Result<()> {
        let mut state = self.state();
        let store = state
            .stores
            .get_mut(collaborator)
            .ok_or_else(|| Error::StoreNotFound(collaborator.to_string()))?;
        store
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn log(&self, endpoint: &str, message: &[u8]) -> Result<()> {
        self.state()
            .logs
            .push((endpoint.to_string(), Bytes::copy_from_slice(message)));
        Ok(())
    }
}
