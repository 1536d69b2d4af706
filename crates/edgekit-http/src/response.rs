use std::net::SocketAddr;

use bytes::Bytes;
use edgekit_core::{Error, Result};
use http::{StatusCode, Version};

use crate::body::Body;
use crate::cookie::{self, Cookie};
use crate::header::HeaderMap;
use crate::request::FramingMode;
use crate::send::Upload;

/// A backend response. Status and headers are complete; the body streams
/// on demand.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Body,
    backend: String,
    remote_addr: Option<SocketAddr>,
    framing: FramingMode,
    upload: Option<Upload>,
}

impl Response {
    pub(crate) fn new(
        status: StatusCode,
        version: Version,
        headers: HeaderMap,
        body: Body,
        backend: String,
        remote_addr: Option<SocketAddr>,
        upload: Option<Upload>,
    ) -> Self {
        Self {
            status,
            version,
            headers,
            body,
            backend,
            remote_addr,
            framing: FramingMode::Automatic,
            upload,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Split into headers and body, e.g. to relay the response downstream.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }

    pub async fn into_bytes(self) -> Result<Bytes> {
        self.body.into_bytes().await
    }

    /// Name of the backend that produced this response.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    pub fn set_framing(&mut self, framing: FramingMode) {
        self.framing = framing;
    }

    /// Failure of a streaming request body that was still being copied
    /// when the response headers arrived. Reported once.
    pub fn upload_error(&mut self) -> Option<Error> {
        self.upload.as_mut().and_then(Upload::try_error)
    }

    /// Wait for a streaming request body to finish copying. Returns
    /// immediately for buffered bodies.
    pub async fn finish_upload(&mut self) -> Result<()> {
        match self.upload.as_mut() {
            Some(upload) => upload.wait().await,
            None => Ok(()),
        }
    }

    /// Cookies set by the backend.
    pub fn cookies(&self) -> Vec<Cookie> {
        cookie::read_set_cookies(&self.headers)
    }
}
