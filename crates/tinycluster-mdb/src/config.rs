//! Machine Database Configuration
//!
//! Defaults with environment variable overrides. The CLI applies its flags on
//! top of [`MdbConfig::from_env`].

use crate::store::ops::RetryPolicy;
use crate::store::DEFAULT_DIAL_TIMEOUT;
use std::time::Duration;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "tiny-cluster";

/// Machine database configuration with sensible defaults
#[derive(Debug, Clone)]
pub struct MdbConfig {
    /// Etcd endpoints (env: ETCD_ENDPOINTS, comma-separated)
    pub etcd_endpoints: Vec<String>,

    /// First segment of every machine key (env: TC_NAMESPACE)
    pub namespace: String,

    /// Bound on opening a store client (env: TC_DIAL_TIMEOUT_SECS)
    pub dial_timeout: Duration,

    /// Deadline for one CLI command (env: TC_REQUEST_TIMEOUT_SECS)
    pub request_timeout: Duration,

    // Conflict backoff settings
    /// First wait after a conflicting update (env: TC_CONFLICT_BACKOFF_INITIAL_MS)
    pub conflict_backoff_initial: Duration,

    /// Upper bound on the wait between attempts (env: TC_CONFLICT_BACKOFF_MAX_MS)
    pub conflict_backoff_max: Duration,

    pub conflict_backoff_multiplier: f64,
}

impl Default for MdbConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            etcd_endpoints: vec!["http://127.0.0.1:2379".to_string()],
            namespace: DEFAULT_NAMESPACE.to_string(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            request_timeout: Duration::from_secs(60),
            conflict_backoff_initial: retry.initial_interval,
            conflict_backoff_max: retry.max_interval,
            conflict_backoff_multiplier: retry.multiplier,
        }
    }
}

impl MdbConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoints) = lookup("ETCD_ENDPOINTS") {
            let endpoints = parse_endpoints(&endpoints);
            if !endpoints.is_empty() {
                config.etcd_endpoints = endpoints;
            }
        }

        if let Some(namespace) = lookup("TC_NAMESPACE") {
            config.namespace = namespace;
        }

        if let Some(secs) = lookup("TC_DIAL_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.dial_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = lookup("TC_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(ms) =
            lookup("TC_CONFLICT_BACKOFF_INITIAL_MS").and_then(|v| v.parse::<u64>().ok())
        {
            config.conflict_backoff_initial = Duration::from_millis(ms);
        }

        if let Some(ms) = lookup("TC_CONFLICT_BACKOFF_MAX_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.conflict_backoff_max = Duration::from_millis(ms);
        }

        config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_interval: self.conflict_backoff_initial,
            max_interval: self.conflict_backoff_max.max(self.conflict_backoff_initial),
            multiplier: self.conflict_backoff_multiplier,
        }
    }
}

/// Split a comma-separated endpoint list, dropping blanks.
pub fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
