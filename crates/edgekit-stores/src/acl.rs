use std::net::IpAddr;
use std::sync::Arc;

use edgekit_core::transport::{Collaborator, Transport};
use edgekit_core::{Context, Error, Result};
use serde::Deserialize;

/// An IP access control list.
#[derive(Clone)]
pub struct Acl {
    transport: Arc<dyn Transport>,
    acl: Collaborator,
}

/// The ACL entry that matched an address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AclResponse {
    /// Matching prefix in CIDR notation.
    #[serde(alias = "Prefix")]
    pub prefix: String,
    /// Action configured for the prefix, e.g. `BLOCK` or `ALLOW`.
    #[serde(alias = "Action")]
    pub action: String,
}

impl Acl {
    pub fn open(ctx: &Context, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("acl name is empty"));
        }
        let transport = ctx.transport()?.clone();
        let acl = Collaborator::Acl(name.to_string());
        transport.open(&acl)?;
        Ok(Self { transport, acl })
    }

    /// The most specific entry matching `ip`, or `NoContent` if none does.
    pub fn lookup(&self, ip: IpAddr) -> Result<AclResponse> {
        let payload = self.transport.lookup(&self.acl, &ip.to_string())?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

impl std::fmt::Debug for Acl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acl").field("acl", &self.acl).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::{ErrorKind, MemoryTransport};

    fn acl() -> Acl {
        let transport = MemoryTransport::new();
        transport.store(
            Collaborator::Acl("blocklist".into()),
            [
                ("10.1.2.3", r#"{"prefix":"10.0.0.0/8","action":"BLOCK"}"#),
                ("2001:db8::1", r#"{"Prefix":"2001:db8::/32","Action":"ALLOW"}"#),
            ],
        );
        let ctx = Context::background().with_transport(Arc::new(transport));
        Acl::open(&ctx, "blocklist").unwrap()
    }

    #[test]
    fn matching_entry() {
        let hit = acl().lookup("10.1.2.3".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix, "10.0.0.0/8");
        assert_eq!(hit.action, "BLOCK");

        let v6 = acl().lookup("2001:db8::1".parse().unwrap()).unwrap();
        assert_eq!(v6.action, "ALLOW");
    }

    #[test]
    fn no_match_is_no_content() {
        let err = acl().lookup("192.168.1.1".parse().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoContent);
    }
}
