//! edgekit HTTP model.
//!
//! [`Request`] and [`Response`] compose a case-insensitive [`HeaderMap`]
//! with a streaming [`Body`] backed by the platform transport. Outbound
//! requests go to named backends through [`Request::send`]; the client
//! response is produced through a [`ResponseWriter`].
//!
//! # Streaming
//!
//! Bodies are pulled from the transport in chunks of at most
//! [`DEFAULT_CHUNK_SIZE`] and written straight through, so a handler can
//! relay or transform a body of any size while holding one chunk at a
//! time. Request bodies may also be supplied as a `Stream` of `Bytes`,
//! which is copied onto the wire while the request is in flight.

mod body;
pub mod cookie;
mod header;
mod request;
mod response;
mod send;
mod writer;

pub use body::{Body, BodyMode, ByteStream, RequestBody, DEFAULT_CHUNK_SIZE};
pub use cookie::{Cookie, SameSite};
pub use header::HeaderMap;
pub use request::{CacheOptions, FramingMode, Request, SandboxMeta};
pub use response::Response;
pub use writer::ResponseWriter;

pub use http::{Method, StatusCode, Uri, Version};
