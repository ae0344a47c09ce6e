//! Read-through lookup and invalidation over a [`CacheStore`].
//!
//! `probe` and `fetch_with` never surface errors — a broken store or a
//! failed producer is logged and absorbed into [`Lookup::Failed`] so the
//! cache can never be the reason a request fails. Invalidation is the one
//! surface that returns `Result`, because a silently dropped invalidation
//! leaves stale data live.
//!
//! There is no per-key locking: concurrent misses for the same key each run
//! their producer and each write, last write wins. Callers that need
//! single-writer freshness must not rely on this layer.

use crate::error::CacheError;
use crate::store::CacheStore;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of a cache lookup.
///
/// Distinguishes "nothing cached" from "the cache layer broke" instead of
/// collapsing both to a null value; [`Lookup::into_value`] gives callers the
/// collapsed view when they don't care.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// A servable value: a live record, or the freshly produced replacement.
    Hit(Value),
    /// Nothing cached and no producer supplied the value.
    Miss,
    /// The store or the producer failed; the failure was logged and absorbed.
    Failed,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// Collapse to the value, dropping the miss/failure distinction.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Failed => None,
        }
    }
}

/// Clone-cheap handle for read-through queries and invalidation.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Look up `key` without a producer. Never writes.
    pub async fn probe(&self, key: &str) -> Lookup {
        match self.store.get(key).await {
            Ok(Some(record)) if record.is_live(Utc::now()) => {
                debug!(key, "cache hit");
                Lookup::Hit(record.value)
            }
            Ok(_) => {
                debug!(key, "cache miss");
                Lookup::Miss
            }
            Err(error) => {
                warn!(key, %error, "cache probe failed");
                Lookup::Failed
            }
        }
    }

    /// Read-through lookup: serve a live record if one exists, otherwise run
    /// `producer`, persist its value under `key` for `ttl`, and serve that.
    ///
    /// The producer is never invoked on a hit. An unreadable store degrades
    /// to running the producer uncached; a failed write still serves the
    /// produced value. Only a failed producer yields [`Lookup::Failed`].
    /// Empty or null producer results are cached as-is.
    pub async fn fetch_with<F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Lookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, CacheError>>,
    {
        let mut store_usable = true;
        match self.store.get(key).await {
            Ok(Some(record)) if record.is_live(Utc::now()) => {
                debug!(key, "cache hit");
                return Lookup::Hit(record.value);
            }
            Ok(_) => debug!(key, "cache miss, recomputing"),
            Err(error) => {
                warn!(key, %error, "cache read failed, recomputing uncached");
                store_usable = false;
            }
        }

        let value = match producer().await {
            Ok(value) => value,
            Err(error) => {
                error!(key, %error, "cache producer failed");
                return Lookup::Failed;
            }
        };

        if store_usable {
            let expires_at = expiry(Utc::now(), ttl);
            if let Err(error) = self.store.upsert(key, &value, expires_at).await {
                warn!(key, %error, "failed to persist cache entry");
            } else {
                debug!(key, ttl_secs = ttl.as_secs(), "cache entry stored");
            }
        }

        Lookup::Hit(value)
    }

    /// Remove the record for an exact key. A missing key is a no-op that
    /// reports zero removed, not an error.
    ///
    /// Fails closed when the store is not ready: the delete is not
    /// attempted and the caller is told, rather than silently leaving the
    /// stale entry live.
    pub async fn invalidate(&self, key: &str) -> Result<u64, CacheError> {
        if !self.store.is_ready() {
            error!(key, "cache store not ready, invalidation aborted");
            return Err(CacheError::StoreUnavailable);
        }
        let removed = self.store.delete(key).await?;
        if removed > 0 {
            info!(key, "cache entry invalidated");
        } else {
            debug!(key, "no cache entry to invalidate");
        }
        Ok(removed)
    }

    /// Remove every record whose key matches `pattern`, e.g. all cached job
    /// listing queries regardless of filter combination. A malformed
    /// pattern deletes nothing and returns the compile error.
    pub async fn invalidate_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        if !self.store.is_ready() {
            error!(pattern, "cache store not ready, invalidation aborted");
            return Err(CacheError::StoreUnavailable);
        }
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(error) => {
                error!(pattern, %error, "invalid cache invalidation pattern");
                return Err(error.into());
            }
        };
        let removed = self.store.delete_matching(&regex).await?;
        info!(pattern, removed, "cache entries invalidated by pattern");
        Ok(removed)
    }
}

/// Absolute expiry instant for a record written now with `ttl` to live.
fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(3600);

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: QueryCache,
        calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let cache = QueryCache::new(store.clone());
            Fixture {
                store,
                cache,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Producer that counts invocations and returns `value`.
        async fn fetch(&self, key: &str, value: Value) -> Lookup {
            let calls = self.calls.clone();
            self.cache
                .fetch_with(key, TTL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(value)
                })
                .await
        }

        fn producer_calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn hit_returns_stored_value_without_recompute() {
        let fx = Fixture::new();
        fx.store
            .upsert(
                "/api/jobs",
                &json!([{"id": 1}]),
                Utc::now() + TimeDelta::hours(1),
            )
            .await
            .unwrap();

        let outcome = fx.fetch("/api/jobs", json!("unused")).await;

        assert_eq!(outcome, Lookup::Hit(json!([{"id": 1}])));
        assert_eq!(fx.producer_calls(), 0);
    }

    #[tokio::test]
    async fn miss_recomputes_once_and_persists() {
        let fx = Fixture::new();
        let before = Utc::now();

        let outcome = fx.fetch("/api/jobs", json!([{"id": 2}])).await;
        let after = Utc::now();

        assert_eq!(outcome, Lookup::Hit(json!([{"id": 2}])));
        assert_eq!(fx.producer_calls(), 1);

        let record = fx.store.get("/api/jobs").await.unwrap().unwrap();
        assert_eq!(record.value, json!([{"id": 2}]));
        let ttl = TimeDelta::from_std(TTL).unwrap();
        assert!(record.expires_at >= before + ttl);
        assert!(record.expires_at <= after + ttl);
    }

    #[tokio::test]
    async fn expired_record_is_recomputed() {
        let fx = Fixture::new();
        fx.store
            .upsert(
                "/api/jobs",
                &json!("stale"),
                Utc::now() - TimeDelta::seconds(1),
            )
            .await
            .unwrap();

        let outcome = fx.fetch("/api/jobs", json!("fresh")).await;

        assert_eq!(outcome, Lookup::Hit(json!("fresh")));
        assert_eq!(fx.producer_calls(), 1);
        let record = fx.store.get("/api/jobs").await.unwrap().unwrap();
        assert_eq!(record.value, json!("fresh"));
    }

    #[tokio::test]
    async fn probe_on_miss_returns_miss_and_writes_nothing() {
        let fx = Fixture::new();

        assert_eq!(fx.cache.probe("/api/jobs").await, Lookup::Miss);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn null_producer_result_is_cached_as_is() {
        let fx = Fixture::new();

        let outcome = fx.fetch("/api/profile/42/resume", Value::Null).await;

        assert_eq!(outcome, Lookup::Hit(Value::Null));
        let record = fx.store.get("/api/profile/42/resume").await.unwrap();
        assert_eq!(record.unwrap().value, Value::Null);
    }

    #[tokio::test]
    async fn producer_failure_is_absorbed_and_writes_nothing() {
        let fx = Fixture::new();

        let outcome = fx
            .cache
            .fetch_with("/api/jobs", TTL, || async {
                Err(CacheError::Producer("db query failed".to_owned()))
            })
            .await;

        assert_eq!(outcome, Lookup::Failed);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn failed_write_still_serves_produced_value() {
        let fx = Fixture::new();
        fx.store.set_fail_writes(true);

        let outcome = fx.fetch("/api/jobs", json!([{"id": 3}])).await;

        assert_eq!(outcome, Lookup::Hit(json!([{"id": 3}])));
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn unreadable_store_degrades_to_uncached_recompute() {
        let fx = Fixture::new();
        fx.store.set_down(true);

        assert_eq!(fx.cache.probe("/api/jobs").await, Lookup::Failed);

        // fetch_with still produces, skipping the cache entirely.
        let calls = fx.calls.clone();
        let outcome = fx
            .cache
            .fetch_with("/api/jobs", TTL, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("direct"))
            })
            .await;
        assert_eq!(outcome, Lookup::Hit(json!("direct")));
        assert_eq!(fx.producer_calls(), 1);
    }

    #[tokio::test]
    async fn invalidating_missing_key_is_a_repeatable_noop() {
        let fx = Fixture::new();

        assert_eq!(fx.cache.invalidate("/api/jobs").await.unwrap(), 0);
        assert_eq!(fx.cache.invalidate("/api/jobs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalidate_removes_exact_key_only() {
        let fx = Fixture::new();
        let live = Utc::now() + TimeDelta::hours(1);
        fx.store.upsert("/api/jobs", &json!(1), live).await.unwrap();
        fx.store
            .upsert("/api/jobs?location=NY", &json!(2), live)
            .await
            .unwrap();

        assert_eq!(fx.cache.invalidate("/api/jobs").await.unwrap(), 1);
        assert!(fx.store.get("/api/jobs").await.unwrap().is_none());
        assert!(
            fx.store
                .get("/api/jobs?location=NY")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn pattern_invalidation_matches_intended_keys_only() {
        let fx = Fixture::new();
        let live = Utc::now() + TimeDelta::hours(1);
        fx.store
            .upsert("api/users/123", &json!(1), live)
            .await
            .unwrap();
        fx.store
            .upsert("api/users/abc", &json!(2), live)
            .await
            .unwrap();

        let removed = fx.cache.invalidate_matching(r"api/users/\d+").await.unwrap();

        assert_eq!(removed, 1);
        assert!(fx.store.get("api/users/123").await.unwrap().is_none());
        assert!(fx.store.get("api/users/abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_pattern_deletes_nothing() {
        let fx = Fixture::new();
        let live = Utc::now() + TimeDelta::hours(1);
        fx.store.upsert("api/jobs", &json!(1), live).await.unwrap();

        let result = fx.cache.invalidate_matching("api/jobs[").await;

        assert!(matches!(result, Err(CacheError::InvalidPattern(_))));
        assert_eq!(fx.store.len(), 1);
    }

    #[tokio::test]
    async fn invalidation_fails_closed_when_store_is_down() {
        let fx = Fixture::new();
        fx.store.set_down(true);

        assert!(matches!(
            fx.cache.invalidate("/api/jobs").await,
            Err(CacheError::StoreUnavailable)
        ));
        assert!(matches!(
            fx.cache.invalidate_matching("api/.*").await,
            Err(CacheError::StoreUnavailable)
        ));
    }

    #[test]
    fn expiry_saturates_on_overflow() {
        let now = Utc::now();
        assert_eq!(expiry(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            expiry(now, Duration::from_secs(60)),
            now + TimeDelta::seconds(60)
        );
    }
}
