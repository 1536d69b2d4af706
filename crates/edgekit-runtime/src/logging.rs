//! Tracing subscriber setup for guest programs.
//!
//! `RUST_LOG` wins over any configured filter. Without either, only
//! `info` and above are emitted.

use std::sync::Arc;

use edgekit_core::EdgekitConfig;
use edgekit_core::transport::Transport;
use edgekit_stores::LogEndpoint;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter(filter: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)))
}

/// Install a global subscriber writing to stderr.
pub fn init(filter: Option<&str>) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Install a global subscriber that ships each event to a real-time log
/// endpoint.
pub fn init_with_endpoint(filter: Option<&str>, endpoint: LogEndpoint) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_ansi(false)
        .with_writer(move || endpoint.clone())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Set up logging from the `[logging]` table of an `edgekit.toml`.
pub fn init_from_config(config: &EdgekitConfig, transport: Arc<dyn Transport>) -> anyhow::Result<()> {
    match config.log_endpoint() {
        Some(name) => {
            let endpoint = LogEndpoint::with_transport(transport, name)?;
            init_with_endpoint(config.log_filter(), endpoint)
        }
        None => init(config.log_filter()),
    }
}
