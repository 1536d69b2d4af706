use std::net::IpAddr;
use std::sync::Arc;

use edgekit_core::transport::{CacheOverride, DownstreamRequest, Transport};
use edgekit_core::{Context, Error, Result};
use http::{Method, Uri, Version};

use crate::body::{Body, BodyMode, RequestBody};
use crate::cookie::{self, Cookie};
use crate::header::HeaderMap;
use crate::response::Response;
use crate::send;

/// Per-request cache directives.
///
/// `pass` bypasses platform caching for this request only. Setting any of
/// the other directives clears `pass`, since they only mean something for
/// a cacheable response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pass: bool,
    pci: bool,
    ttl: Option<u32>,
    stale_while_revalidate: Option<u32>,
    surrogate_key: Option<String>,
}

impl CacheOptions {
    pub fn pass(&self) -> bool {
        self.pass
    }

    pub fn set_pass(&mut self, pass: bool) {
        self.pass = pass;
    }

    pub fn pci(&self) -> bool {
        self.pci
    }

    pub fn set_pci(&mut self, pci: bool) {
        self.pci = pci;
        self.pass = false;
    }

    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    /// Override the response's TTL, in seconds.
    pub fn set_ttl(&mut self, seconds: u32) {
        self.ttl = Some(seconds);
        self.pass = false;
    }

    pub fn stale_while_revalidate(&self) -> Option<u32> {
        self.stale_while_revalidate
    }

    pub fn set_stale_while_revalidate(&mut self, seconds: u32) {
        self.stale_while_revalidate = Some(seconds);
        self.pass = false;
    }

    pub fn surrogate_key(&self) -> Option<&str> {
        self.surrogate_key.as_deref()
    }

    pub fn set_surrogate_key(&mut self, key: impl Into<String>) {
        self.surrogate_key = Some(key.into());
        self.pass = false;
    }

    pub(crate) fn to_override(&self) -> CacheOverride {
        CacheOverride {
            pass: self.pass,
            pci: self.pci,
            ttl: self.ttl,
            stale_while_revalidate: self.stale_while_revalidate,
            surrogate_key: self.surrogate_key.clone(),
        }
    }
}

/// Whether Content-Length/Transfer-Encoding are computed by the platform
/// (`Automatic`) or sent exactly as the caller set them (`Manual`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramingMode {
    #[default]
    Automatic,
    Manual,
}

/// Identity of the sandbox that received an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxMeta {
    /// Opaque, stable for every request one sandbox serves.
    pub sandbox_id: String,
    pub request_id: String,
    /// Requests this sandbox dispatched before this one.
    pub sandbox_requests: u64,
}

/// An HTTP request, inbound from a client or outbound to a backend.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: RequestBody,
    cache: CacheOptions,
    framing: FramingMode,
    remote_addr: Option<IpAddr>,
    server_addr: Option<IpAddr>,
    meta: Option<SandboxMeta>,
    sent: bool,
}

impl Request {
    /// Build a request. Sending it requires an absolute URL.
    pub fn new(method: &str, url: &str, body: impl Into<RequestBody>) -> Result<Self> {
        Ok(Self {
            method: parse_method(method)?,
            uri: parse_url(url)?,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: body.into(),
            cache: CacheOptions::default(),
            framing: FramingMode::Automatic,
            remote_addr: None,
            server_addr: None,
            meta: None,
            sent: false,
        })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new("GET", url, ())
    }

    /// Wrap a request delivered by the platform.
    pub fn from_downstream(
        transport: Arc<dyn Transport>,
        inbound: DownstreamRequest,
        meta: Option<SandboxMeta>,
    ) -> Result<Self> {
        let body = Body::from_handle(transport, inbound.body, BodyMode::Read);
        Ok(Self {
            method: parse_method(&inbound.method)?,
            uri: parse_url(&inbound.uri)?,
            version: parse_version(&inbound.protocol),
            headers: HeaderMap::from_wire(inbound.headers),
            body: body.into(),
            cache: CacheOptions::default(),
            framing: FramingMode::Automatic,
            remote_addr: inbound.client_addr,
            server_addr: inbound.server_addr,
            meta,
            sent: false,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: &str) -> Result<()> {
        self.method = parse_method(method)?;
        Ok(())
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_url(&mut self, url: &str) -> Result<()> {
        self.uri = parse_url(url)?;
        Ok(())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// The `Host` header if present, else the URL's authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get("Host")
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) {
        self.body = body.into();
    }

    /// Move the body out, leaving an empty one behind.
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::take(&mut self.body)
    }

    pub fn into_body(self) -> RequestBody {
        self.body
    }

    pub fn cache_options(&self) -> &CacheOptions {
        &self.cache
    }

    pub fn cache_options_mut(&mut self) -> &mut CacheOptions {
        &mut self.cache
    }

    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    /// Takes effect only if the request has not been sent yet.
    pub fn set_framing(&mut self, framing: FramingMode) {
        self.framing = framing;
    }

    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    pub fn server_addr(&self) -> Option<IpAddr> {
        self.server_addr
    }

    pub fn sandbox_meta(&self) -> Option<&SandboxMeta> {
        self.meta.as_ref()
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        cookie::read_cookies(&self.headers, None)
    }

    pub fn cookie(&self, name: &str) -> Result<Cookie> {
        cookie::read_cookies(&self.headers, Some(name))
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("cookie {name:?}")))
    }

    /// Add `cookie` to the request's single `Cookie` header.
    pub fn add_cookie(&mut self, cookie: &Cookie) -> Result<()> {
        if cookie.name.is_empty() {
            return Err(Error::invalid_argument("cookie name is empty"));
        }
        let pair = cookie.to_string();
        let joined = match self.headers.get("Cookie") {
            Some(existing) if !existing.is_empty() => format!("{existing}; {pair}"),
            _ => pair,
        };
        self.headers.set("Cookie", joined);
        Ok(())
    }

    /// A copy of everything but the body, ready to be sent again.
    pub fn clone_without_body(&self) -> Self {
        Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            version: self.version,
            headers: self.headers.clone(),
            body: RequestBody::empty(),
            cache: self.cache.clone(),
            framing: self.framing,
            remote_addr: self.remote_addr,
            server_addr: self.server_addr,
            meta: self.meta.clone(),
            sent: false,
        }
    }

    pub fn clone_with_body(&self, body: impl Into<RequestBody>) -> Self {
        let mut clone = self.clone_without_body();
        clone.body = body.into();
        clone
    }

    /// Send this request to `backend` and wait for the response headers.
    ///
    /// Fails with `DeadlineExceeded` or `Cancelled` if `ctx` finishes
    /// first. A request may be sent only once; later calls fail with
    /// `AlreadySent`.
    pub async fn send(&mut self, ctx: &Context, backend: &str) -> Result<Response> {
        send::send(ctx, self, backend).await
    }
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.as_bytes()).map_err(|_| Error::InvalidMethod(method.to_string()))
}

fn parse_url(url: &str) -> Result<Uri> {
    url.parse::<Uri>().map_err(|e| Error::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn parse_version(protocol: &str) -> Version {
    match protocol {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/2" | "HTTP/2.0" => Version::HTTP_2,
        "HTTP/3" | "HTTP/3.0" => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}
