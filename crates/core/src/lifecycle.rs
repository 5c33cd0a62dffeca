//! Record lifetime computation and cache hygiene.
//!
//! Remote records carry an absolute `expiresAt` stamped at write time and are
//! evicted lazily by whichever reader finds them expired. The in-memory cache
//! is additionally swept on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;

use crate::cache::MemoryCache;

/// Fixed TTL applied to every record written to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLifetime {
    ttl: Duration,
}

impl RecordLifetime {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `(saved_at, expires_at)` for a record written now.
    pub fn stamp(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let saved_at = Utc::now();
        (saved_at, expires_at(saved_at, self.ttl))
    }
}

/// `saved_at + ttl`, saturating at the largest representable instant.
pub fn expires_at(saved_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| saved_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}

/// Spawn the periodic cache sweep.
///
/// The task runs until the returned handle is aborted.
pub fn spawn_cache_sweeper(cache: Arc<MemoryCache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.sweep();
            if removed > 0 {
                tracing::debug!(removed, remaining = cache.len(), "swept expired cache entries");
            }
        }
    })
}
