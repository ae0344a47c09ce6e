//! Persistent read-through cache for JSON API responses.
//!
//! Route handlers (or the [`middleware::CacheLayer`] on their behalf) look
//! values up through a [`query::QueryCache`] keyed by request path; misses
//! run the real database query and persist the result with a TTL. Mutating
//! handlers invalidate by exact key or regex pattern after a successful
//! write. The backing store is pluggable via [`store::CacheStore`] — a
//! Postgres table in production, an in-memory map in tests.
//!
//! The cache is strictly best-effort: a broken store or a failed write only
//! ever costs callers an uncached (slower) response, never an error.

pub mod config;
pub mod error;
pub mod keys;
pub mod middleware;
pub mod query;
pub mod store;
pub mod sweep;

pub use config::CacheConfig;
pub use error::CacheError;
pub use middleware::CacheLayer;
pub use query::{Lookup, QueryCache};
pub use store::{CacheRecord, CacheStore, MemoryStore, PgCacheStore};
