//! The narrow seam between the SDK and the platform.
//!
//! Everything the SDK needs from the host goes through [`Transport`]. The
//! records here are plain data; they deliberately say nothing about how a
//! particular platform encodes them on the wire. A production adapter
//! maps them onto hostcalls, and [`MemoryTransport`](crate::memory::MemoryTransport)
//! implements them in memory for tests.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Opaque handle to a platform-owned body stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(u32);

impl BodyHandle {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// An HTTP header as a name-value pair, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireHeader {
    pub name: String,
    pub value: String,
}

impl WireHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An inbound client request as delivered by the platform.
#[derive(Debug, Clone)]
pub struct DownstreamRequest {
    pub method: String,
    /// Absolute request URI.
    pub uri: String,
    /// Protocol version, e.g. `"HTTP/1.1"`.
    pub protocol: String,
    pub headers: Vec<WireHeader>,
    pub body: BodyHandle,
    pub client_addr: Option<IpAddr>,
    pub server_addr: Option<IpAddr>,
    /// Platform-assigned request identifier.
    pub request_id: String,
}

/// Cache directives attached to an outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOverride {
    pub pass: bool,
    pub pci: bool,
    pub ttl: Option<u32>,
    pub stale_while_revalidate: Option<u32>,
    pub surrogate_key: Option<String>,
}

/// An outbound request, fully framed and ready to hand to the platform.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<WireHeader>,
    pub body: BodyHandle,
    pub cache: CacheOverride,
    /// Send caller-provided Content-Length/Transfer-Encoding verbatim.
    pub manual_framing: bool,
    /// The body is still being written while the request is in flight.
    pub streaming: bool,
}

/// A backend response whose headers have arrived. The body may still be
/// streaming.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub protocol: String,
    pub headers: Vec<WireHeader>,
    pub body: BodyHandle,
    pub remote_addr: Option<SocketAddr>,
}

/// Status line and headers of a response sent to the client.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<WireHeader>,
    pub manual_framing: bool,
}

/// An external data source consulted through [`Transport::lookup`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collaborator {
    ConfigStore(String),
    SecretStore(String),
    KvStore(String),
    Acl(String),
    Geo,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::ConfigStore(name) => write!(f, "config store {name:?}"),
            Collaborator::SecretStore(name) => write!(f, "secret store {name:?}"),
            Collaborator::KvStore(name) => write!(f, "kv store {name:?}"),
            Collaborator::Acl(name) => write!(f, "acl {name:?}"),
            Collaborator::Geo => f.write_str("geolocation"),
        }
    }
}

/// Platform operations the SDK depends on.
///
/// `next_request`, `send`, and `read_body` may suspend; callers wrap them
/// in [`Context::run`](crate::Context::run) so cancellation drops the
/// in-flight call. Everything else completes immediately.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Wait for the next inbound request. `None` means the platform will
    /// deliver no more requests to this sandbox.
    async fn next_request(&self) -> Result<Option<DownstreamRequest>>;

    /// Send a request to a named backend and wait for its response headers.
    async fn send(&self, backend: &str, request: UpstreamRequest) -> Result<UpstreamResponse>;

    fn new_body(&self) -> Result<BodyHandle>;

    /// Read up to `max` bytes. An empty result means end of stream.
    async fn read_body(&self, body: BodyHandle, max: usize) -> Result<Bytes>;

    fn write_body(&self, body: BodyHandle, chunk: &[u8]) -> Result<usize>;

    /// Move the contents of `src` onto the end of `dest`.
    fn append_body(&self, dest: BodyHandle, src: BodyHandle) -> Result<()>;

    /// Finish writing. Readers drain what was written, then see end of
    /// stream.
    fn close_body(&self, body: BodyHandle) -> Result<()>;

    /// Discard a body and release its handle. A body abandoned while still
    /// being written is never delivered as complete: its readers fail
    /// instead of seeing end of stream. Abandoning a released handle is a
    /// no-op.
    fn abandon_body(&self, body: BodyHandle) -> Result<()>;

    /// Begin the client response. With `streaming`, body bytes flow to the
    /// client as they are written; otherwise they are buffered until close.
    fn send_downstream(&self, head: ResponseHead, body: BodyHandle, streaming: bool) -> Result<()>;

    /// Check that a collaborator exists and may be used.
    fn open(&self, collaborator: &Collaborator) -> Result<()>;

    fn lookup(&self, collaborator: &Collaborator, key: &str) -> Result<Bytes>;

    fn insert(&self, collaborator: &Collaborator, key: &str, value: Bytes) -> Result<()>;

    fn delete(&self, collaborator: &Collaborator, key: &str) -> Result<()>;

    /// Emit one log event on a named endpoint.
    fn log(&self, endpoint: &str, message: &[u8]) -> Result<()>;
}
