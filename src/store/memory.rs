//! In-memory cache store for tests and single-process deployments.
//!
//! Same contract as the Postgres store, backed by a `DashMap`. Carries two
//! failure toggles so the degradation paths (store down, writes rejected)
//! can be exercised without a real outage.

use crate::error::CacheError;
use crate::store::{CacheRecord, CacheStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheRecord>,
    down: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store connection going away. While down, every
    /// operation fails with [`CacheError::StoreUnavailable`].
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::Release);
    }

    /// Make subsequent `upsert` calls fail while reads keep working.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_up(&self) -> Result<(), CacheError> {
        if self.down.load(Ordering::Acquire) {
            return Err(CacheError::StoreUnavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        self.check_up()?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.check_up()?;
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(CacheError::Backend("write rejected".to_owned()));
        }
        self.entries.insert(
            key.to_owned(),
            CacheRecord {
                key: key.to_owned(),
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        self.check_up()?;
        Ok(self.entries.remove(key).map_or(0, |_| 1))
    }

    async fn delete_matching(&self, pattern: &Regex) -> Result<u64, CacheError> {
        self.check_up()?;
        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| pattern.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        let mut removed = 0;
        for key in matched {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError> {
        self.check_up()?;
        let before = self.entries.len();
        self.entries.retain(|_, record| record.is_live(now));
        Ok((before - self.entries.len()) as u64)
    }

    fn is_ready(&self) -> bool {
        !self.down.load(Ordering::Acquire)
    }
}
