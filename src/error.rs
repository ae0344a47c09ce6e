//! Error types for the cache layer.

/// Failures a cache operation can hit.
///
/// Read paths absorb these into [`crate::query::Lookup::Failed`] and log;
/// only the invalidation API returns them to callers, because a dropped
/// invalidation means stale data stays live.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store is not ready")]
    StoreUnavailable,
    #[error("cache store query failed")]
    Store(#[from] sqlx::Error),
    #[error("invalid invalidation pattern")]
    InvalidPattern(#[from] regex::Error),
    #[error("failed to serialize cached value")]
    Serialization(#[from] serde_json::Error),
    #[error("value producer failed: {0}")]
    Producer(String),
    #[error("cache store rejected the operation: {0}")]
    Backend(String),
}
