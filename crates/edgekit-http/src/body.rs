//! Streaming message bodies.
//!
//! A [`Body`] is a thin cursor over a platform body handle. Reads pull
//! chunks from the transport on demand and writes go straight through, so
//! a body is never buffered whole unless the caller asks for it with
//! [`Body::into_bytes`].

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use edgekit_core::transport::{BodyHandle, Transport};
use edgekit_core::{Context, Error, Result};
use futures_core::Stream;
use futures_util::StreamExt;

/// Largest chunk requested from the transport in one read (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A type-erased, fallible async stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Which ends of a body this value may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Read,
    Write,
    Duplex,
}

impl BodyMode {
    fn readable(self) -> bool {
        matches!(self, BodyMode::Read | BodyMode::Duplex)
    }

    fn writable(self) -> bool {
        matches!(self, BodyMode::Write | BodyMode::Duplex)
    }
}

/// A readable and/or writable byte stream backed by the platform.
///
/// End of stream is sticky: once a read returns `0`, every later read
/// returns `0` again. Writing after [`close`](Body::close) fails with
/// [`Error::StreamClosed`]; closing twice is a no-op. Dropping a body
/// without closing it leaves cleanup to the platform.
pub struct Body {
    transport: Arc<dyn Transport>,
    handle: BodyHandle,
    mode: BodyMode,
    pending: Bytes,
    eof: bool,
    closed: bool,
}

impl Body {
    /// A fresh duplex body: bytes written to it can be read back.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        let handle = transport.new_body()?;
        Ok(Self::from_handle(transport, handle, BodyMode::Duplex))
    }

    /// A fresh body bound to the transport carried by `ctx`.
    pub fn with_context(ctx: &Context) -> Result<Self> {
        Self::new(ctx.transport()?.clone())
    }

    /// Wrap a handle the platform already owns.
    pub fn from_handle(transport: Arc<dyn Transport>, handle: BodyHandle, mode: BodyMode) -> Self {
        Self {
            transport,
            handle,
            mode,
            pending: Bytes::new(),
            eof: false,
            closed: false,
        }
    }

    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    pub fn mode(&self) -> BodyMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Bytes already pulled from the transport but not yet handed out.
    pub(crate) fn take_pending(&mut self) -> Bytes {
        std::mem::take(&mut self.pending)
    }

    /// Next chunk from the transport, or `None` at end of stream.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        if !self.mode.readable() {
            return Err(Error::invalid_argument(format!("{} is write-only", self.handle)));
        }
        if !self.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        if self.eof {
            return Ok(None);
        }
        let chunk = self
            .transport
            .read_body(self.handle, DEFAULT_CHUNK_SIZE)
            .await?;
        if chunk.is_empty() {
            self.eof = true;
            return Ok(None);
        }
        Ok(Some(chunk))
    }

    /// Fill `buf` with up to `buf.len()` bytes. `Ok(0)` means end of
    /// stream (or an empty `buf`).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.read_chunk().await? {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    /// [`read`](Body::read), abandoned with `Cancelled` or
    /// `DeadlineExceeded` if `ctx` finishes first.
    pub async fn read_with(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        ctx.run(self.read(buf)).await?
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        if !self.mode.writable() {
            return Err(Error::invalid_argument(format!("{} is read-only", self.handle)));
        }
        self.transport.write_body(self.handle, chunk)
    }

    pub fn write_all(&mut self, mut chunk: &[u8]) -> Result<()> {
        while !chunk.is_empty() {
            let n = self.write(chunk)?;
            if n == 0 {
                return Err(Error::transport(format!("{} accepted no bytes", self.handle)));
            }
            chunk = &chunk[n..];
        }
        Ok(())
    }

    /// Finish the body. For a writable body, readers drain what was
    /// written and then see end of stream. For a read-only body, unread
    /// bytes are discarded.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.mode.writable() {
            self.transport.close_body(self.handle)
        } else {
            self.pending = Bytes::new();
            self.eof = true;
            Ok(())
        }
    }

    /// Read everything that remains.
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.read_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    pub fn into_stream(self) -> ByteStream {
        Box::pin(futures_util::stream::unfold(Some(self), |body| async move {
            let mut body = body?;
            match body.read_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(body))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        }))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("handle", &self.handle)
            .field("mode", &self.mode)
            .field("pending", &self.pending.len())
            .field("eof", &self.eof)
            .field("closed", &self.closed)
            .finish()
    }
}

impl io::Write for Body {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Body::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Kind {
    Empty,
    Bytes(Bytes),
    Stream { stream: ByteStream, pending: Bytes },
    Body(Body),
}

/// The body of a [`Request`](crate::Request): nothing, a buffer, a
/// caller-supplied stream, or a platform body.
pub struct RequestBody {
    kind: Kind,
}

impl RequestBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// A body produced incrementally while the request is in flight.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            kind: Kind::Stream {
                stream: Box::pin(stream),
                pending: Bytes::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Bytes(bytes) => bytes.is_empty(),
            Kind::Stream { .. } | Kind::Body(_) => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.kind, Kind::Stream { .. })
    }

    /// The platform body, when this is one.
    pub fn as_body_mut(&mut self) -> Option<&mut Body> {
        match &mut self.kind {
            Kind::Body(body) => Some(body),
            _ => None,
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.kind {
            Kind::Empty => Ok(0),
            Kind::Bytes(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                bytes.advance(n);
                Ok(n)
            }
            Kind::Stream { stream, pending } => {
                while pending.is_empty() {
                    match stream.next().await {
                        Some(chunk) => *pending = chunk?,
                        None => return Ok(0),
                    }
                }
                let n = pending.len().min(buf.len());
                buf[..n].copy_from_slice(&pending[..n]);
                pending.advance(n);
                Ok(n)
            }
            Kind::Body(body) => body.read(buf).await,
        }
    }

    pub async fn read_with(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        ctx.run(self.read(buf)).await?
    }

    pub async fn into_bytes(self) -> Result<Bytes> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Bytes(bytes) => Ok(bytes),
            Kind::Body(body) => body.into_bytes().await,
            kind @ Kind::Stream { .. } => {
                let mut stream = RequestBody { kind }.into_stream();
                let mut out = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk?);
                }
                Ok(out.freeze())
            }
        }
    }

    pub fn into_stream(self) -> ByteStream {
        match self.kind {
            Kind::Empty => Box::pin(futures_util::stream::empty::<Result<Bytes>>()),
            Kind::Bytes(bytes) if bytes.is_empty() => {
                Box::pin(futures_util::stream::empty::<Result<Bytes>>())
            }
            Kind::Bytes(bytes) => {
                Box::pin(futures_util::stream::once(async move { Ok::<_, Error>(bytes) }))
            }
            Kind::Stream { stream, pending } if pending.is_empty() => stream,
            Kind::Stream { stream, pending } => {
                Box::pin(futures_util::stream::once(async move { Ok::<_, Error>(pending) }).chain(stream))
            }
            Kind::Body(body) => body.into_stream(),
        }
    }

    pub(crate) fn into_kind(self) -> RequestBodyKind {
        match self.kind {
            Kind::Empty => RequestBodyKind::Buffered(Bytes::new()),
            Kind::Bytes(bytes) => RequestBodyKind::Buffered(bytes),
            kind @ Kind::Stream { .. } => RequestBodyKind::Stream(RequestBody { kind }.into_stream()),
            Kind::Body(body) => RequestBodyKind::Platform(body),
        }
    }
}

/// How the send path should hand a request body to the transport.
pub(crate) enum RequestBodyKind {
    Buffered(Bytes),
    Stream(ByteStream),
    Platform(Body),
}

impl From<RequestBodyKind> for RequestBody {
    fn from(kind: RequestBodyKind) -> Self {
        match kind {
            RequestBodyKind::Buffered(bytes) => bytes.into(),
            RequestBodyKind::Stream(stream) => Self {
                kind: Kind::Stream {
                    stream,
                    pending: Bytes::new(),
                },
            },
            RequestBodyKind::Platform(body) => body.into(),
        }
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("RequestBody::Empty"),
            Kind::Bytes(bytes) => write!(f, "RequestBody::Bytes({} bytes)", bytes.len()),
            Kind::Stream { .. } => f.write_str("RequestBody::Stream"),
            Kind::Body(body) => f.debug_tuple("RequestBody::Body").field(body).finish(),
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl From<Body> for RequestBody {
    fn from(body: Body) -> Self {
        Self {
            kind: Kind::Body(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::MemoryTransport;
    use std::time::Duration;

    fn transport() -> Arc<dyn Transport> {
        Arc::new(MemoryTransport::new())
    }

    #[tokio::test]
    async fn byte_at_a_time_round_trip() {
        let mut body = Body::new(transport()).unwrap();
        let input = b"streaming!";
        for byte in input {
            assert_eq!(body.write(std::slice::from_ref(byte)).unwrap(), 1);
        }
        body.close().unwrap();

        let mut out = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            match body.read(&mut buf).await.unwrap() {
                0 => break,
                n => out.extend_from_slice(&buf[..n]),
            }
        }
        assert_eq!(out, input);

        for _ in 0..3 {
            assert_eq!(body.read(&mut buf).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn write_after_close_is_stream_closed() {
        let mut body = Body::new(transport()).unwrap();
        body.write_all(b"abc").unwrap();
        body.close().unwrap();
        body.close().unwrap();
        assert!(matches!(body.write(b"d"), Err(Error::StreamClosed)));
    }

    #[tokio::test]
    async fn read_only_body_rejects_writes() {
        let transport = transport();
        let handle = transport.new_body().unwrap();
        let mut body = Body::from_handle(transport, handle, BodyMode::Read);
        assert!(matches!(body.write(b"x"), Err(Error::InvalidArgument(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn read_with_honours_deadline() {
        let mut body = Body::new(transport()).unwrap();
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let mut buf = [0u8; 8];
        let err = body.read_with(&ctx, &mut buf).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn into_stream_yields_all_chunks() {
        let mut body = Body::new(transport()).unwrap();
        body.write_all(b"hello ").unwrap();
        body.write_all(b"world").unwrap();
        body.close().unwrap();

        let chunks: Vec<Bytes> = body
            .into_stream()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), b"hello world");
    }

    #[tokio::test]
    async fn request_body_reads_from_stream() {
        let stream = futures_util::stream::iter(vec![Ok(Bytes::from("ab")), Ok(Bytes::from("c"))]);
        let mut body = RequestBody::from_stream(stream);
        let mut buf = [0u8; 1];
        let mut out = Vec::new();
        while body.read(&mut buf).await.unwrap() == 1 {
            out.push(buf[0]);
        }
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn request_body_from_bytes() {
        let body = RequestBody::from("payload");
        assert!(!body.is_empty());
        assert_eq!(body.into_bytes().await.unwrap(), "payload");
        assert!(RequestBody::empty().into_bytes().await.unwrap().is_empty());
    }
}
