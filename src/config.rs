//! TTL configuration for the cache layer.
//!
//! Three TTL tiers, selected per use site: a default for ordinary reads,
//! a long tier for static payloads (text content, uploaded assets), and a
//! short tier for fast-moving listing data. Loadable from `CACHE_*`
//! environment variables; every field has a default so an empty
//! environment works.

use figment::providers::Env;
use figment::{Error, Figment};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Fallback TTL for reads without a more specific tier (seconds).
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Long-lived, rarely-changing payloads (seconds).
    #[serde(default = "static_ttl_secs")]
    pub static_ttl_secs: u64,
    /// Frequently-changing listing data (seconds).
    #[serde(default = "dynamic_ttl_secs")]
    pub dynamic_ttl_secs: u64,
    /// Cadence of the expired-row sweep (seconds).
    #[serde(default = "sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn static_ttl_secs() -> u64 {
    86_400
}

fn dynamic_ttl_secs() -> u64 {
    1800
}

fn sweep_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            static_ttl_secs: static_ttl_secs(),
            dynamic_ttl_secs: dynamic_ttl_secs(),
            sweep_interval_secs: sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Load from `CACHE_`-prefixed environment variables
    /// (e.g. `CACHE_DEFAULT_TTL_SECS=600`).
    pub fn from_env() -> Result<Self, Error> {
        Figment::new().merge(Env::prefixed("CACHE_")).extract()
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn static_ttl(&self) -> Duration {
        Duration::from_secs(self.static_ttl_secs)
    }

    pub fn dynamic_ttl(&self) -> Duration {
        Duration::from_secs(self.dynamic_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
