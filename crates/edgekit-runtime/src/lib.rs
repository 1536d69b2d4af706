//! edgekit request dispatch.
//!
//! [`serve`] handles one request per sandbox. [`ServeMany`] keeps a sandbox
//! alive across a sequence of requests, retiring it when a configured limit
//! is reached.

pub mod handler;
pub mod logging;
pub mod scheduler;
pub mod serve;

pub use handler::{Handler, HandlerFn, handler_fn};
pub use scheduler::{ServeMany, ServeSummary};
pub use serve::serve;
