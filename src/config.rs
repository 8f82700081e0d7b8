//! Configuration Module
//!
//! Connection and cache parameters for the accessor. Supplied once at
//! construction and never mutated afterwards.

use std::time::Duration;

use serde::Deserialize;

/// Default store address used by a local Consul agent.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8500";

/// Default interval between sweeps of expired cache entries.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Accessor configuration parameters.
///
/// Every field has a default, so a partial document deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store address, `host:port` with an optional `http://` or `https://` prefix
    pub address: String,
    /// Maximum concurrent connections to the store, 0 = unlimited
    pub max_conns: usize,
    /// Request timeout for store calls, zero = no timeout
    pub timeout: Duration,
    /// Skip TLS certificate verification
    pub insecure_skip_verify: bool,
    /// Time-to-live applied to every cache write
    pub default_cache_time: Duration,
    /// Background cleanup interval for expired entries
    pub cleanup_interval: Duration,
}

impl Config {
    /// Creates a config for the given address with all other fields defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            max_conns: 0,
            timeout: Duration::ZERO,
            insecure_skip_verify: false,
            default_cache_time: Duration::from_secs(60),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}
