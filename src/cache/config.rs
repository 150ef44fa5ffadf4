//! Cache configuration.

use std::{num::NonZeroUsize, path::PathBuf};

const DEFAULT_DATABASE_PATH: &str = "cache.db";
const DEFAULT_LRU_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(5000) {
    Some(value) => value,
    None => NonZeroUsize::MIN,
};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// SQLite file backing the durable tier.
    pub database_path: PathBuf,
    /// Capacity of the in-memory tier.
    pub lru_max_entries: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            lru_max_entries: DEFAULT_LRU_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            database_path: settings.database_path.clone(),
            lru_max_entries: settings.lru_max_entries,
        }
    }
}
