//! edgekit core: the pieces every other edgekit crate builds on.
//!
//! - [`Error`] and [`ErrorKind`], the SDK-wide error taxonomy.
//! - [`Context`], carrying cancellation, an optional deadline, the bound
//!   [`Transport`], and the serve-many [`SessionControl`].
//! - [`SandboxEnvironment`], the explicit form of the platform's
//!   environment variables.
//! - [`EdgekitConfig`] and [`ServeManyOptions`], loaded from
//!   `edgekit.toml`.
//! - [`Transport`], the seam to the platform, and [`MemoryTransport`], an
//!   in-memory implementation of it.

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod memory;
pub mod session;
pub mod transport;

pub use config::{EdgekitConfig, ServeManyOptions};
pub use context::Context;
pub use env::SandboxEnvironment;
pub use error::{Error, ErrorKind, Result, SendErrorKind};
pub use memory::MemoryTransport;
pub use session::{RetireReason, SandboxSession, SessionControl};
pub use transport::{BodyHandle, Collaborator, Transport};

/// Boxed, sendable future used at object-safe async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
