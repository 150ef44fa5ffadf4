//! Folio cache system
//!
//! Two independent tiers hold the same entry shape:
//!
//! - **lru**: bounded in-process map, lost on restart;
//! - **sqlite**: durable file shared across restarts and processes.
//!
//! [`Cachified`] layers read-through semantics on top of either tier:
//! freshness windows, stale-while-revalidate, forced refresh and coalescing of
//! concurrent productions for the same key. [`CacheService`] owns both tiers
//! for the lifetime of the process.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! database_path = "cache.db"
//! lru_max_entries = 5000
//! ```

mod cachified;
mod config;
mod durable;
mod entry;
mod freshness;
mod lock;
mod memory;
mod service;
mod store;
mod timing;

pub use cachified::{BoxError, Cachified, CachifiedError, CachifiedOptions, CheckValue};
pub use config::CacheConfig;
pub use durable::SqliteStore;
pub use entry::{CacheEntry, CacheMetadata, EntryState, now_ms};
pub use freshness::{ForceFresh, FreshnessContext, should_force_fresh};
pub use memory::MemoryStore;
pub use service::{CacheKeys, CacheService};
pub use store::{CacheError, CacheStore, Tier};
pub use timing::{TimingRecord, Timings};
