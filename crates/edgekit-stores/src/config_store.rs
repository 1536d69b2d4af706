use std::sync::Arc;

use bytes::Bytes;
use edgekit_core::transport::{Collaborator, Transport};
use edgekit_core::{Context, Error, Result};
use tracing::debug;

/// Read-only string key/value configuration.
#[derive(Clone)]
pub struct ConfigStore {
    transport: Arc<dyn Transport>,
    store: Collaborator,
}

/// Legacy name for [`ConfigStore`].
#[deprecated(note = "use ConfigStore")]
pub type Dictionary = ConfigStore;

impl ConfigStore {
    pub fn open(ctx: &Context, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("config store name is empty"));
        }
        let transport = ctx.transport()?.clone();
        let store = Collaborator::ConfigStore(name.to_string());
        transport.open(&store)?;
        debug!(store = name, "config store opened");
        Ok(Self { transport, store })
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        match self.transport.lookup(&self.store, key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn get_bytes(&self, key: &str) -> Result<Bytes> {
        self.transport.lookup(&self.store, key)
    }

    /// The value for `key` as text.
    pub fn get(&self, key: &str) -> Result<String> {
        let bytes = self.get_bytes(key)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::invalid_argument(format!("value for {key:?} is not UTF-8")))
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").field("store", &self.store).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::MemoryTransport;

    fn ctx() -> Context {
        let transport = MemoryTransport::new();
        transport.store(
            Collaborator::ConfigStore("settings".into()),
            [("greeting", "hello"), ("binary", "\u{0}\u{1}")],
        );
        Context::background().with_transport(Arc::new(transport))
    }

    #[test]
    fn get_and_has() {
        let store = ConfigStore::open(&ctx(), "settings").unwrap();
        assert_eq!(store.get("greeting").unwrap(), "hello");
        assert!(store.has("greeting").unwrap());
        assert!(!store.has("missing").unwrap());
        assert!(matches!(store.get("missing"), Err(Error::NotFound(_))));
        assert_eq!(store.get_bytes("binary").unwrap().as_ref(), b"\x00\x01");
    }

    #[test]
    fn empty_key_is_invalid() {
        let store = ConfigStore::open(&ctx(), "settings").unwrap();
        assert!(matches!(store.get(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn unknown_store() {
        assert!(matches!(
            ConfigStore::open(&ctx(), "nope"),
            Err(Error::StoreNotFound(_))
        ));
    }

    #[test]
    #[allow(deprecated)]
    fn dictionary_alias_is_a_config_store() {
        let dict: Dictionary = Dictionary::open(&ctx(), "settings").unwrap();
        assert_eq!(dict.get("greeting").unwrap(), "hello");
    }
}
