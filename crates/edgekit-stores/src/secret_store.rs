use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use edgekit_core::transport::{Collaborator, Transport};
use edgekit_core::{Context, Error, Result};

/// Named secrets. Values are only exposed through [`Secret::plaintext`].
#[derive(Clone)]
pub struct SecretStore {
    transport: Arc<dyn Transport>,
    store: Collaborator,
}

impl SecretStore {
    pub fn open(ctx: &Context, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("secret store name is empty"));
        }
        let transport = ctx.transport()?.clone();
        let store = Collaborator::SecretStore(name.to_string());
        transport.open(&store)?;
        Ok(Self { transport, store })
    }

    pub fn get(&self, name: &str) -> Result<Secret> {
        let plaintext = self.transport.lookup(&self.store, name)?;
        Ok(Secret { plaintext })
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore").field("store", &self.store).finish()
    }
}

/// A secret value. `Debug` never prints it.
#[derive(Clone)]
pub struct Secret {
    plaintext: Bytes,
}

impl Secret {
    /// Wrap bytes obtained elsewhere so they can be handled like a stored
    /// secret.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            plaintext: bytes.into(),
        }
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::MemoryTransport;

    #[test]
    fn get_secret() {
        let transport = MemoryTransport::new();
        transport.store(Collaborator::SecretStore("vault".into()), [("api-key", "s3cr3t")]);
        let ctx = Context::background().with_transport(Arc::new(transport));

        let store = SecretStore::open(&ctx, "vault").unwrap();
        let secret = store.get("api-key").unwrap();
        assert_eq!(secret.plaintext(), b"s3cr3t");
        assert_eq!(format!("{secret:?}"), "Secret(<redacted>)");
        assert!(matches!(store.get("other"), Err(Error::NotFound(_))));
    }

    #[test]
    fn from_bytes() {
        assert_eq!(Secret::from_bytes("raw").plaintext(), b"raw");
    }
}
