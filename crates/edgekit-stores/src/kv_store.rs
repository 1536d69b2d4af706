use std::sync::Arc;

use bytes::Bytes;
use edgekit_core::transport::{Collaborator, Transport};
use edgekit_core::{Context, Error, Result};
use tracing::debug;

/// A mutable key/value store.
#[derive(Clone)]
pub struct KvStore {
    transport: Arc<dyn Transport>,
    store: Collaborator,
}

/// A value read from a [`KvStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub body: Bytes,
}

impl Entry {
    /// The value as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl KvStore {
    pub fn open(ctx: &Context, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("kv store name is empty"));
        }
        let transport = ctx.transport()?.clone();
        let store = Collaborator::KvStore(name.to_string());
        transport.open(&store)?;
        Ok(Self { transport, store })
    }

    pub fn lookup(&self, key: &str) -> Result<Entry> {
        let body = self.transport.lookup(&self.store, key)?;
        Ok(Entry {
            key: key.to_string(),
            body,
        })
    }

    pub fn insert(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        let value = value.into();
        debug!(store = %self.store, key, len = value.len(), "kv insert");
        self.transport.insert(&self.store, key, value)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.transport.delete(&self.store, key)
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore").field("store", &self.store).finish()
    }
}
