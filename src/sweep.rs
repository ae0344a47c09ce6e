//! Background purge of expired cache records.
//!
//! The store does not drop rows the instant their `expires_at` passes; a
//! detached task sweeps them out on a fixed cadence instead. Reads never
//! depend on the sweep — [`crate::store::CacheRecord::is_live`] guards
//! every lookup — so the sweep only reclaims space and keeps pattern
//! deletes from scanning dead rows.

use crate::store::CacheStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn the sweeper task. Sweep failures are logged and the task keeps
/// running; abort the returned handle on shutdown.
pub fn spawn_sweeper(store: Arc<dyn CacheStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "expired cache entries swept"),
                Err(error) => warn!(%error, "cache sweep failed"),
            }
        }
    })
}
