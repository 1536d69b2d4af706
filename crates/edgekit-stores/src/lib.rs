//! Platform collaborators reached through the edgekit transport.
//!
//! Each store is opened by name from a [`Context`](edgekit_core::Context)
//! that carries a transport. Lookups that find nothing fail with
//! `NotFound` (stores) or `NoContent` (ACLs); nothing is cached or retried
//! here.

pub mod acl;
pub mod config_store;
pub mod geo;
pub mod kv_store;
pub mod rtlog;
pub mod secret_store;

pub use acl::{Acl, AclResponse};
#[allow(deprecated)]
pub use config_store::{ConfigStore, Dictionary};
pub use geo::Geo;
pub use kv_store::{Entry, KvStore};
pub use rtlog::LogEndpoint;
pub use secret_store::{Secret, SecretStore};
