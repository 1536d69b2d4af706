//! edgekit.toml configuration parser.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Limits for a reusable sandbox. All three are enforced independently;
/// whichever is reached first retires the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeManyOptions {
    /// Longest wait for the next inbound request.
    pub next_timeout: Duration,
    /// Dispatch ceiling for one sandbox.
    pub max_requests: u64,
    /// Wall-clock ceiling measured from scheduler start.
    pub max_lifetime: Duration,
}

impl Default for ServeManyOptions {
    fn default() -> Self {
        Self {
            next_timeout: Duration::from_secs(1),
            max_requests: 100,
            max_lifetime: Duration::from_secs(5),
        }
    }
}

impl ServeManyOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::invalid_argument("max_requests must be positive"));
        }
        if self.next_timeout.is_zero() {
            return Err(Error::invalid_argument("next_timeout must be positive"));
        }
        if self.max_lifetime.is_zero() {
            return Err(Error::invalid_argument("max_lifetime must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgekitConfig {
    pub serve_many: Option<ServeManyConfig>,
    pub logging: Option<LoggingConfig>,
    pub env: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeManyConfig {
    pub next_timeout: Option<String>,
    pub max_requests: Option<u64>,
    pub max_lifetime: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub endpoint: Option<String>,
}

impl EdgekitConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: EdgekitConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Serve-many limits with unset fields taken from the defaults.
    pub fn serve_many_options(&self) -> anyhow::Result<ServeManyOptions> {
        let defaults = ServeManyOptions::default();
        let Some(section) = &self.serve_many else {
            return Ok(defaults);
        };

        let options = ServeManyOptions {
            next_timeout: match &section.next_timeout {
                Some(s) => parse_duration(s)
                    .with_context(|| format!("invalid serve_many.next_timeout {s:?}"))?,
                None => defaults.next_timeout,
            },
            max_requests: section.max_requests.unwrap_or(defaults.max_requests),
            max_lifetime: match &section.max_lifetime {
                Some(s) => parse_duration(s)
                    .with_context(|| format!("invalid serve_many.max_lifetime {s:?}"))?,
                None => defaults.max_lifetime,
            },
        };
        options.validate()?;
        Ok(options)
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.logging.as_ref()?.filter.as_deref()
    }

    pub fn log_endpoint(&self) -> Option<&str> {
        self.logging.as_ref()?.endpoint.as_deref()
    }
}

/// Parse `"250ms"`, `"5s"`, `"2m"`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn parse_full_config() {
        let config = EdgekitConfig::from_str(
            r#"
[serve_many]
next_timeout = "100ms"
max_requests = 3
max_lifetime = "10s"

[logging]
filter = "edgekit=debug"
endpoint = "access-log"

[env]
FASTLY_TRACE_ID = "trace-1"
"#,
        )
        .unwrap();

        let options = config.serve_many_options().unwrap();
        assert_eq!(options.next_timeout, Duration::from_millis(100));
        assert_eq!(options.max_requests, 3);
        assert_eq!(options.max_lifetime, Duration::from_secs(10));
        assert_eq!(config.log_filter(), Some("edgekit=debug"));
        assert_eq!(config.log_endpoint(), Some("access-log"));
        assert_eq!(
            config.env.as_ref().unwrap().get("FASTLY_TRACE_ID").map(String::as_str),
            Some("trace-1")
        );
    }

    #[test]
    fn missing_section_uses_defaults() {
        let config = EdgekitConfig::from_str("").unwrap();
        assert_eq!(config.serve_many_options().unwrap(), ServeManyOptions::default());
        assert_eq!(config.log_filter(), None);
    }

    #[test]
    fn zero_max_requests_rejected() {
        let config = EdgekitConfig::from_str("[serve_many]\nmax_requests = 0\n").unwrap();
        assert!(config.serve_many_options().is_err());
    }

    #[test]
    fn bad_duration_rejected() {
        let config = EdgekitConfig::from_str("[serve_many]\nnext_timeout = \"later\"\n").unwrap();
        let err = config.serve_many_options().unwrap_err();
        assert!(err.to_string().contains("next_timeout"));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = EdgekitConfig {
            serve_many: Some(ServeManyConfig {
                next_timeout: Some("1s".into()),
                max_requests: Some(10),
                max_lifetime: None,
            }),
            logging: None,
            env: None,
        };
        let text = config.to_toml_string().unwrap();
        let parsed = EdgekitConfig::from_str(&text).unwrap();
        assert_eq!(parsed.serve_many_options().unwrap().max_requests, 10);
    }
}
