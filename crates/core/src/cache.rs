//! In-memory TTL cache in front of the remote store.
//!
//! Values are held as JSON so one cache serves every payload type. Entries
//! expire lazily on access and proactively via [`MemoryCache::sweep`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use crate::category::TtlClass;

/// Cached value with its write time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub written_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.written_at.elapsed() >= self.ttl
    }
}

/// Keyed cache with two TTL classes.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    quote_ttl: Duration,
}

impl MemoryCache {
    pub fn new(default_ttl: Duration, quote_ttl: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), default_ttl, quote_ttl }
    }

    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Default => self.default_ttl,
            TtlClass::Quote => self.quote_ttl,
        }
    }

    /// Get a live value, dropping the entry if it has expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                tracing::debug!(key, "cache entry expired");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: Value, class: TtlClass) {
        let ttl = self.ttl_for(class);
        self.set_with_ttl(key, value, ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) {
        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry { value, written_at: Instant::now(), ttl });
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
