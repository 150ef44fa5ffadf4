//! Bounded in-process tier.

use std::{num::NonZeroUsize, sync::Mutex};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::{
    entry::{CacheEntry, now_ms},
    lock::lock_tier,
    store::{CacheError, CacheStore},
};

const TIER: &str = "lru";
const METRIC_LRU_EVICT_TOTAL: &str = "folio_cache_lru_evict_total";
const METRIC_LRU_EXPIRED_TOTAL: &str = "folio_cache_lru_expired_total";

struct Slot {
    entry: CacheEntry,
    expires_at: Option<i64>,
}

impl Slot {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

/// LRU tier with per-entry expiry derived from the entry metadata.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Slot>>,
}

impl MemoryStore {
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
        }
    }

    /// Live keys, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        let now = now_ms();
        lock_tier(&self.entries, TIER, "keys")
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Live keys containing `query`, most recently used first.
    pub fn search(&self, query: &str) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|key| key.contains(query))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock_tier(&self.entries, TIER, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = lock_tier(&self.entries, TIER, "get");
        let expired = entries.peek(key)?.is_expired(now_ms());
        if expired {
            entries.pop(key);
            counter!(METRIC_LRU_EXPIRED_TOTAL).increment(1);
            debug!(tier = TIER, key, "dropped expired entry");
            return None;
        }
        entries.get(key).map(|slot| slot.entry.clone())
    }

    fn write(&self, key: &str, entry: CacheEntry) {
        let slot = Slot {
            expires_at: entry.metadata.expires_at(),
            entry,
        };
        let displaced = lock_tier(&self.entries, TIER, "set").push(key.to_string(), slot);
        // `push` also hands back the previous value when the key was already present.
        if let Some((evicted, _)) = displaced.filter(|(evicted, _)| evicted != key) {
            counter!(METRIC_LRU_EVICT_TOTAL).increment(1);
            debug!(tier = TIER, evicted = %evicted, "evicted least recently used entry");
        }
    }

    fn remove(&self, key: &str) {
        lock_tier(&self.entries, TIER, "delete").pop(key);
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.write(key, entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(key);
        Ok(())
    }
}
