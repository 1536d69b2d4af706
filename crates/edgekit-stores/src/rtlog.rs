use std::io;
use std::sync::Arc;

use edgekit_core::transport::Transport;
use edgekit_core::{Context, Error, Result};

/// A named real-time log endpoint. Every write is one log event; nothing
/// can be read back.
#[derive(Clone)]
pub struct LogEndpoint {
    transport: Arc<dyn Transport>,
    name: String,
}

impl LogEndpoint {
    pub fn open(ctx: &Context, name: &str) -> Result<Self> {
        Self::with_transport(ctx.transport()?.clone(), name)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("log endpoint name is empty"));
        }
        Ok(Self {
            transport,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self, message: impl AsRef<[u8]>) -> Result<()> {
        self.transport.log(&self.name, message.as_ref())
    }
}

impl io::Write for LogEndpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for LogEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEndpoint").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::MemoryTransport;
    use std::io::Write as _;

    #[test]
    fn each_write_is_one_event() {
        let transport = MemoryTransport::new();
        let ctx = Context::background().with_transport(Arc::new(transport.clone()));
        let mut endpoint = LogEndpoint::open(&ctx, "access").unwrap();

        endpoint.log("first").unwrap();
        endpoint.write_all(b"second 2").unwrap();

        let logs = transport.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0], ("access".to_string(), "first".into()));
        assert_eq!(logs[1].1, "second 2");
    }

    #[test]
    fn empty_name_rejected() {
        let ctx = Context::background().with_transport(Arc::new(MemoryTransport::new()));
        assert!(LogEndpoint::open(&ctx, "").is_err());
    }
}
