use std::io;
use std::sync::Arc;

use edgekit_core::transport::{ResponseHead, Transport};
use edgekit_core::{Error, Result};
use http::StatusCode;
use tracing::warn;

use crate::body::{Body, BodyMode};
use crate::header::HeaderMap;
use crate::request::FramingMode;
use crate::response::Response;

const EARLY_HINTS: u16 = 103;

/// Writes the response to the client.
///
/// Headers go out on the first [`write_header`](Self::write_header),
/// [`write`](Self::write), [`append`](Self::append), or
/// [`close`](Self::close); after that, header changes have no effect. Body
/// bytes stream to the client as they are written.
pub struct ResponseWriter {
    transport: Arc<dyn Transport>,
    headers: HeaderMap,
    body: Body,
    status: Option<StatusCode>,
    framing: FramingMode,
    deferred: Option<Error>,
}

impl ResponseWriter {
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        let handle = transport.new_body()?;
        let body = Body::from_handle(transport.clone(), handle, BodyMode::Write);
        Ok(Self {
            transport,
            headers: HeaderMap::new(),
            body,
            status: None,
            framing: FramingMode::Automatic,
            deferred: None,
        })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Status sent to the client, once headers are out.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers_sent(&self) -> bool {
        self.status.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_closed()
    }

    /// Send Content-Length/Transfer-Encoding exactly as set in the headers.
    pub fn set_manual_framing(&mut self, manual: bool) {
        self.framing = if manual {
            FramingMode::Manual
        } else {
            FramingMode::Automatic
        };
    }

    fn head(&self, status: u16) -> ResponseHead {
        let mut headers = self.headers.clone();
        if self.framing == FramingMode::Automatic || status == EARLY_HINTS {
            headers.delete("Content-Length");
            headers.delete("Transfer-Encoding");
        }
        ResponseHead {
            status,
            headers: headers.to_wire(),
            manual_framing: self.framing == FramingMode::Manual,
        }
    }

    /// Send the status line and headers.
    ///
    /// Only the first call counts; later ones are logged and ignored.
    /// `103 Early Hints` is the exception and may be sent any number of
    /// times before the final status. Any other 1xx status is refused and
    /// reported by the next `write` or `close`.
    pub fn write_header(&mut self, status: u16) {
        if let Some(sent) = self.status {
            warn!(status, sent = sent.as_u16(), "superfluous write_header call");
            return;
        }
        let code = match StatusCode::from_u16(status) {
            Ok(code) if !code.is_informational() || status == EARLY_HINTS => code,
            _ => {
                self.deferred = Some(Error::InvalidStatusCode(status));
                return;
            }
        };

        let head = self.head(status);
        if let Err(err) = self.transport.send_downstream(head, self.body.handle(), true) {
            self.deferred = Some(err);
            return;
        }
        if status != EARLY_HINTS {
            self.status = Some(code);
        }
    }

    fn ensure_headers(&mut self) -> Result<()> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        if self.status.is_none() {
            self.write_header(StatusCode::OK.as_u16());
            if let Some(err) = self.deferred.take() {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Write body bytes, sending `200 OK` headers first if none were sent.
    pub fn write(&mut self, chunk: &[u8]) -> Result<usize> {
        if self.body.is_closed() {
            return Err(Error::StreamClosed);
        }
        self.ensure_headers()?;
        self.body.write(chunk)
    }

    pub fn write_all(&mut self, chunk: &[u8]) -> Result<()> {
        if self.body.is_closed() {
            return Err(Error::StreamClosed);
        }
        self.ensure_headers()?;
        self.body.write_all(chunk)
    }

    /// Splice `body` onto the end of the response without copying it
    /// through the handler.
    pub fn append(&mut self, mut body: Body) -> Result<()> {
        if self.body.is_closed() {
            return Err(Error::StreamClosed);
        }
        self.ensure_headers()?;
        let pending = body.take_pending();
        if !pending.is_empty() {
            self.body.write_all(&pending)?;
        }
        self.transport.append_body(self.body.handle(), body.handle())
    }

    /// Finish the response. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.body.is_closed() {
            return Ok(());
        }
        self.ensure_headers()?;
        self.body.close()
    }

    /// Forward a backend response to the client. Its status, headers and
    /// framing mode replace the writer's, and its body is spliced on.
    pub fn relay(&mut self, response: Response) -> Result<()> {
        if self.headers_sent() {
            return Err(Error::invalid_argument("response headers already sent"));
        }
        self.set_manual_framing(response.framing() == FramingMode::Manual);
        let (status, headers, body) = response.into_parts();
        self.headers.reset(&headers);
        self.write_header(status.as_u16());
        self.append(body)
    }

    /// Answer with a plain-text error: `status` and `message` followed by a
    /// newline. Used when a handler could not produce a response; an
    /// invalid status set earlier is discarded.
    pub fn send_error(&mut self, status: StatusCode, message: &str) -> Result<()> {
        self.deferred = None;
        self.headers.set("Content-Type", "text/plain; charset=utf-8");
        self.headers.set("X-Content-Type-Options", "nosniff");
        self.write_header(status.as_u16());
        self.write_all(message.as_bytes())?;
        self.write_all(b"\n")?;
        self.close()
    }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("framing", &self.framing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::MemoryTransport;
    use std::io::Write as _;

    fn writer() -> (MemoryTransport, ResponseWriter) {
        let transport = MemoryTransport::new();
        let w = ResponseWriter::new(Arc::new(transport.clone())).unwrap();
        (transport, w)
    }

    #[test]
    fn implicit_ok_on_first_write() {
        let (transport, mut w) = writer();
        w.headers_mut().set("Content-Type", "text/plain");
        write!(w, "hello {}", 42).unwrap();
        w.close().unwrap();
        w.close().unwrap();

        let responses = transport.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, 200);
        assert_eq!(responses[0].header("content-type"), Some("text/plain"));
        assert_eq!(responses[0].body_str(), "hello 42");
        assert!(responses[0].streaming);
    }

    #[test]
    fn second_write_header_is_ignored() {
        let (transport, mut w) = writer();
        w.write_header(404);
        w.write_header(500);
        w.close().unwrap();
        assert_eq!(w.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(transport.responses()[0].status, 404);
    }

    #[test]
    fn early_hints_do_not_fix_the_status() {
        let (transport, mut w) = writer();
        w.headers_mut().set("Link", "</style.css>; rel=preload");
        w.write_header(103);
        w.write_header(103);
        assert!(!w.headers_sent());
        w.write_header(201);
        w.close().unwrap();
        assert_eq!(transport.responses()[0].status, 201);
    }

    #[test]
    fn invalid_informational_status_surfaces_on_write() {
        let (_transport, mut w) = writer();
        w.write_header(101);
        assert!(matches!(w.write(b"x"), Err(Error::InvalidStatusCode(101))));
    }

    #[test]
    fn send_error_replaces_invalid_status() {
        let (transport, mut w) = writer();
        w.write_header(101);
        assert!(matches!(w.close(), Err(Error::InvalidStatusCode(101))));

        w.send_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").unwrap();
        let responses = transport.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, 500);
        assert_eq!(responses[0].body_str(), "Internal Server Error\n");
    }

    #[test]
    fn write_after_close_fails() {
        let (_transport, mut w) = writer();
        w.close().unwrap();
        assert!(matches!(w.write(b"late"), Err(Error::StreamClosed)));
    }

    #[test]
    fn automatic_framing_drops_length_headers() {
        let (transport, mut w) = writer();
        w.headers_mut().set("Content-Length", "999");
        w.close().unwrap();
        assert_eq!(transport.responses()[0].header("content-length"), None);

        let (transport, mut w) = writer();
        w.set_manual_framing(true);
        w.headers_mut().set("Content-Length", "0");
        w.close().unwrap();
        let response = &transport.responses()[0];
        assert_eq!(response.header("content-length"), Some("0"));
        assert!(response.manual_framing);
    }

    #[test]
    fn send_error_writes_plain_text() {
        let (transport, mut w) = writer();
        w.send_error(StatusCode::BAD_GATEWAY, "upstream unavailable").unwrap();
        let response = &transport.responses()[0];
        assert_eq!(response.status, 502);
        assert_eq!(response.body_str(), "upstream unavailable\n");
    }

    #[tokio::test]
    async fn append_splices_body() {
        let (transport, mut w) = writer();
        let shared: Arc<dyn Transport> = Arc::new(transport.clone());
        let mut extra = Body::new(shared).unwrap();
        extra.write_all(b" world").unwrap();
        extra.close().unwrap();

        w.write_all(b"hello").unwrap();
        w.append(extra).unwrap();
        w.close().unwrap();
        assert_eq!(transport.responses()[0].body_str(), "hello world");
    }
}
