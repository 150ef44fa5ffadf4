//! Process-wide handle over both cache tiers.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::{
    cachified::Cachified,
    config::CacheConfig,
    durable::SqliteStore,
    entry::CacheEntry,
    memory::MemoryStore,
    store::{CacheError, CacheStore, Tier},
};

/// Keys per tier, as reported to administrators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheKeys {
    pub sqlite: Vec<String>,
    pub lru: Vec<String>,
}

/// Built once at startup, closed at shutdown, cloned into request handlers.
#[derive(Clone)]
pub struct CacheService {
    memory: Arc<MemoryStore>,
    durable: Arc<SqliteStore>,
    cachified: Cachified,
}

impl CacheService {
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let durable = SqliteStore::open(&config.database_path).await?;
        info!(
            lru_max_entries = config.lru_max_entries.get(),
            database = %config.database_path.display(),
            "cache service initialised"
        );
        Ok(Self {
            memory: Arc::new(MemoryStore::new(config.lru_max_entries)),
            durable: Arc::new(durable),
            cachified: Cachified::new(),
        })
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn durable(&self) -> &Arc<SqliteStore> {
        &self.durable
    }

    pub fn cachified(&self) -> &Cachified {
        &self.cachified
    }

    fn store(&self, tier: Tier) -> &dyn CacheStore {
        match tier {
            Tier::Sqlite => self.durable.as_ref(),
            Tier::Lru => self.memory.as_ref(),
        }
    }

    /// Up to `limit` keys from each tier.
    pub async fn list_keys(&self, limit: u32) -> Result<CacheKeys, CacheError> {
        let sqlite = self.durable.keys(limit).await?;
        let lru = truncate(self.memory.keys(), limit);
        Ok(CacheKeys { sqlite, lru })
    }

    /// Up to `limit` keys from each tier containing `query`.
    pub async fn search_keys(&self, query: &str, limit: u32) -> Result<CacheKeys, CacheError> {
        let sqlite = self.durable.search(query, limit).await?;
        let lru = truncate(self.memory.search(query), limit);
        Ok(CacheKeys { sqlite, lru })
    }

    pub async fn get(&self, tier: Tier, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.store(tier).get(key).await
    }

    pub async fn set(&self, tier: Tier, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.store(tier).set(key, entry).await?;
        info!(tier = %tier, key, "cache entry written");
        Ok(())
    }

    pub async fn delete(&self, tier: Tier, key: &str) -> Result<(), CacheError> {
        self.store(tier).delete(key).await?;
        info!(tier = %tier, key, "cache entry deleted");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), CacheError> {
        self.durable.health_check().await
    }

    pub async fn close(&self) {
        self.durable.close().await;
        info!("cache service closed");
    }
}

fn truncate(mut keys: Vec<String>, limit: u32) -> Vec<String> {
    keys.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    keys
}
