//! Cache persistence: the record shape and the store contract.
//!
//! The store holds at most one record per key (upsert-by-key semantics) and
//! sweeps expired rows on its own schedule, decoupled from reads. A row
//! returned by `get` may therefore have lapsed between sweeps — every read
//! goes through [`CacheRecord::is_live`] rather than trusting store-side
//! deletion.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgCacheStore;

use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

/// A single cached entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub key: String,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Whether the record is still servable at `now`.
    ///
    /// Strict comparison: a record whose `expires_at` equals `now` is
    /// already dead.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Contract the backing store must satisfy.
///
/// Injected as a handle (`Arc<dyn CacheStore>`) so callers and tests can
/// substitute backends. Writes fully replace the record under a key, never
/// merge; deletes are idempotent and report how many records they removed.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Point lookup by exact key.
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError>;

    /// Insert or fully replace the record for `key`.
    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError>;

    /// Remove the record for an exact key. Removing a missing key is not an
    /// error and reports zero removed.
    async fn delete(&self, key: &str) -> Result<u64, CacheError>;

    /// Remove every record whose key matches `pattern` (unanchored, like
    /// Postgres `~`). Returns the number removed.
    async fn delete_matching(&self, pattern: &Regex) -> Result<u64, CacheError>;

    /// Remove every record with `expires_at <= now`. Driven by the sweeper
    /// (see [`crate::sweep`]); reads never depend on it having run.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError>;

    /// Whether the store connection is usable right now. Invalidation
    /// fails closed when this is false.
    fn is_ready(&self) -> bool;
}
