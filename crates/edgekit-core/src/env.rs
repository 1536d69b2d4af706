//! Explicit sandbox environment.
//!
//! The platform describes the sandbox through `FASTLY_*` environment
//! variables. They are captured once, at the API boundary, into a
//! [`SandboxEnvironment`] that is injected wherever it is needed instead
//! of being read ad hoc.

use std::collections::BTreeMap;

pub const TRACE_ID: &str = "FASTLY_TRACE_ID";
pub const HOSTNAME: &str = "FASTLY_HOSTNAME";
pub const SERVICE_ID: &str = "FASTLY_SERVICE_ID";
pub const SERVICE_VERSION: &str = "FASTLY_SERVICE_VERSION";
pub const POP: &str = "FASTLY_POP";
pub const REGION: &str = "FASTLY_REGION";
pub const CACHE_GENERATION: &str = "FASTLY_CACHE_GENERATION";
pub const CUSTOMER_ID: &str = "FASTLY_CUSTOMER_ID";
pub const IS_STAGING: &str = "FASTLY_IS_STAGING";

const PLATFORM_PREFIX: &str = "FASTLY_";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxEnvironment {
    vars: BTreeMap<String, String>,
}

impl SandboxEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the platform's `FASTLY_*` variables from the process
    /// environment.
    pub fn from_process_env() -> Self {
        std::env::vars()
            .filter(|(name, _)| name.starts_with(PLATFORM_PREFIX))
            .collect()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Merge `other` into `self`; values from `other` win.
    pub fn extend<I>(&mut self, other: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.vars.extend(other);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Opaque identifier of this sandbox. Stable across every request a
    /// reused sandbox serves.
    pub fn sandbox_id(&self) -> &str {
        self.get(TRACE_ID).unwrap_or_default()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.get(HOSTNAME)
    }

    pub fn service_id(&self) -> Option<&str> {
        self.get(SERVICE_ID)
    }

    pub fn service_version(&self) -> Option<u32> {
        self.get(SERVICE_VERSION)?.parse().ok()
    }

    pub fn pop(&self) -> Option<&str> {
        self.get(POP)
    }

    pub fn region(&self) -> Option<&str> {
        self.get(REGION)
    }

    pub fn cache_generation(&self) -> Option<u64> {
        self.get(CACHE_GENERATION)?.parse().ok()
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.get(CUSTOMER_ID)
    }

    pub fn is_staging(&self) -> bool {
        matches!(self.get(IS_STAGING), Some("1") | Some("true"))
    }
}

impl FromIterator<(String, String)> for SandboxEnvironment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let env = SandboxEnvironment::new()
            .with(TRACE_ID, "abc123")
            .with(SERVICE_VERSION, "42")
            .with(POP, "LHR")
            .with(IS_STAGING, "1");

        assert_eq!(env.sandbox_id(), "abc123");
        assert_eq!(env.service_version(), Some(42));
        assert_eq!(env.pop(), Some("LHR"));
        assert!(env.is_staging());
        assert_eq!(env.hostname(), None);
    }

    #[test]
    fn missing_trace_id_is_empty() {
        assert_eq!(SandboxEnvironment::new().sandbox_id(), "");
    }

    #[test]
    fn unparsable_numbers_are_none() {
        let env = SandboxEnvironment::new().with(CACHE_GENERATION, "x");
        assert_eq!(env.cache_generation(), None);
    }

    #[test]
    fn extend_overwrites() {
        let mut env = SandboxEnvironment::new().with(REGION, "EU-West");
        env.extend([(REGION.to_string(), "US-East".to_string())]);
        assert_eq!(env.region(), Some("US-East"));
    }
}
