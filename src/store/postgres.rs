//! Postgres-backed cache store.
//!
//! Records live in the `cache_entries` table; `ON CONFLICT (key) DO UPDATE`
//! keeps at most one row per key. Pattern deletion uses Postgres `~` so the
//! store matches the same patterns the application validates with the
//! `regex` crate. Expired rows are removed by the background sweeper, not
//! on read.

use crate::error::CacheError;
use crate::store::{CacheRecord, CacheStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use sqlx::PgPool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    value       JSONB NOT NULL,
    expires_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS cache_entries_expires_at_idx
    ON cache_entries (expires_at);
"#;

/// Row shape for `cache_entries`.
#[derive(sqlx::FromRow)]
struct CacheRow {
    key: String,
    value: Value,
    expires_at: DateTime<Utc>,
}

impl From<CacheRow> for CacheRecord {
    fn from(row: CacheRow) -> Self {
        CacheRecord {
            key: row.key,
            value: row.value,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table and sweep index if absent. Idempotent;
    /// call once at startup.
    pub async fn ensure_schema(&self) -> Result<(), CacheError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT key, value, expires_at FROM cache_entries WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CacheRecord::from))
    }

    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_matching(&self, pattern: &Regex) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key ~ $1")
            .bind(pattern.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn is_ready(&self) -> bool {
        !self.pool.is_closed()
    }
}
