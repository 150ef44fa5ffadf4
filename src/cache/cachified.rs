//! Read-through orchestration over a single cache tier.
//!
//! Given a key, a tier and a producer, [`Cachified::run`] decides between
//! three paths:
//!
//! - **fresh hit**: the cached entry is within its `ttl` and is returned as is;
//! - **stale hit**: the entry is past `ttl` but inside the
//!   stale-while-revalidate window; it is returned immediately while a
//!   background task produces a replacement;
//! - **blocking miss**: nothing usable is cached (absent, expired, rejected by
//!   `check_value`, or forced fresh), so the caller waits for the producer.
//!
//! Productions are registered per `(tier, key)`. Any caller that finds a
//! production already in flight joins it, so concurrent misses and repeated
//! stale reads trigger one producer call. Productions run as spawned tasks and
//! complete even when the request that started them goes away.

use std::{
    error::Error as StdError,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    entry::{CacheEntry, CacheMetadata, EntryState},
    freshness::{ForceFresh, FreshnessContext, should_force_fresh},
    store::CacheStore,
    timing::Timings,
};

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Predicate applied to the JSON form of cached and freshly produced values.
pub type CheckValue = fn(&Value) -> bool;

const METRIC_HIT_TOTAL: &str = "folio_cache_hit_total";
const METRIC_MISS_TOTAL: &str = "folio_cache_miss_total";
const METRIC_COALESCED_TOTAL: &str = "folio_cache_coalesced_total";
const METRIC_FRESH_VALUE_MS: &str = "folio_cache_fresh_value_ms";
const METRIC_FRESH_VALUE_FAILED_TOTAL: &str = "folio_cache_fresh_value_failed_total";

#[derive(Debug, Clone, Error)]
pub enum CachifiedError {
    #[error("producing a fresh value for `{key}` failed: {source}")]
    Produce {
        key: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },
    #[error("fresh value for `{key}` was rejected by its check")]
    Rejected { key: String },
    #[error("value for `{key}` could not be converted: {message}")]
    Convert { key: String, message: String },
    #[error("production of `{key}` did not complete: {message}")]
    Aborted { key: String, message: String },
}

impl CachifiedError {
    pub fn key(&self) -> &str {
        match self {
            CachifiedError::Produce { key, .. }
            | CachifiedError::Rejected { key }
            | CachifiedError::Convert { key, .. }
            | CachifiedError::Aborted { key, .. } => key,
        }
    }

    fn convert(key: &str, err: serde_json::Error) -> Self {
        Self::Convert {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

/// Options for one read-through call.
#[derive(Debug, Clone)]
pub struct CachifiedOptions<'a> {
    key: &'a str,
    ttl: Option<Duration>,
    stale_while_revalidate: Option<Duration>,
    check_value: Option<CheckValue>,
    force_fresh: Option<ForceFresh>,
    context: Option<&'a FreshnessContext>,
    timings: Option<&'a Timings>,
}

impl<'a> CachifiedOptions<'a> {
    /// Unbounded `ttl`, no stale window, no check, not forced.
    pub fn new(key: &'a str) -> Self {
        Self {
            key,
            ttl: None,
            stale_while_revalidate: Some(Duration::ZERO),
            check_value: None,
            force_fresh: None,
            context: None,
            timings: None,
        }
    }

    pub fn key(&self) -> &'a str {
        self.key
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn stale_while_revalidate(mut self, window: Duration) -> Self {
        self.stale_while_revalidate = Some(window);
        self
    }

    /// Keep serving stale values for as long as they are cached.
    pub fn stale_forever(mut self) -> Self {
        self.stale_while_revalidate = None;
        self
    }

    pub fn check_value(mut self, check: CheckValue) -> Self {
        self.check_value = Some(check);
        self
    }

    pub fn force_fresh(mut self, force: impl Into<ForceFresh>) -> Self {
        self.force_fresh = Some(force.into());
        self
    }

    pub fn context(mut self, context: &'a FreshnessContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn timings(mut self, timings: &'a Timings) -> Self {
        self.timings = Some(timings);
        self
    }
}

type Production = Shared<BoxFuture<'static, Result<Value, CachifiedError>>>;

/// Registry of productions currently running, keyed by `tier:key`.
#[derive(Clone, Default)]
struct InFlight {
    productions: Arc<DashMap<String, Production>>,
}

/// Removes the registry slot when the production finishes, panics included.
struct SlotGuard {
    productions: Arc<DashMap<String, Production>>,
    slot: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.productions.remove(&self.slot);
    }
}

impl InFlight {
    /// Join the production for `slot`, or spawn `production` if there is none.
    /// The flag is `true` when this call started the production.
    fn join_or_start<P>(&self, slot: String, key: &str, production: P) -> (Production, bool)
    where
        P: Future<Output = Result<Value, CachifiedError>> + Send + 'static,
    {
        match self.productions.entry(slot) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let guard = SlotGuard {
                    productions: Arc::clone(&self.productions),
                    slot: entry.key().clone(),
                };
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    production.await
                });
                let key = key.to_string();
                let shared = async move {
                    handle.await.unwrap_or_else(|err| {
                        Err(CachifiedError::Aborted {
                            key,
                            message: err.to_string(),
                        })
                    })
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                (shared, true)
            }
        }
    }

    fn len(&self) -> usize {
        self.productions.len()
    }
}

/// What a production needs to persist its result.
struct WritePlan {
    key: String,
    ttl: Option<Duration>,
    swr: Option<Duration>,
    check_value: Option<CheckValue>,
}

/// The read-through orchestrator; cheap to clone, clones share in-flight state.
#[derive(Clone, Default)]
pub struct Cachified {
    in_flight: InFlight,
}

impl Cachified {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of productions currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn run<C, V, F, Fut, E>(
        &self,
        cache: &Arc<C>,
        options: CachifiedOptions<'_>,
        get_fresh_value: F,
    ) -> Result<V, CachifiedError>
    where
        C: CacheStore + ?Sized + 'static,
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let started = Instant::now();
        let result = self.resolve(cache, &options, get_fresh_value).await;
        if let Some(timings) = options.timings {
            timings.record(
                format!("cache:{}", options.key),
                format!("{} cache retrieval", options.key),
                started.elapsed(),
            );
        }
        result
    }

    async fn resolve<C, V, F, Fut, E>(
        &self,
        cache: &Arc<C>,
        options: &CachifiedOptions<'_>,
        get_fresh_value: F,
    ) -> Result<V, CachifiedError>
    where
        C: CacheStore + ?Sized + 'static,
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let key = options.key;
        let tier = cache.name();
        let forced = should_force_fresh(options.force_fresh.as_ref(), options.context, key);

        let miss_reason = if forced {
            "forced"
        } else {
            match read_cached::<C, V>(cache.as_ref(), key, options.check_value).await {
                Some((value, EntryState::Fresh)) => {
                    counter!(METRIC_HIT_TOTAL, "tier" => tier, "state" => "fresh").increment(1);
                    debug!(tier, key, outcome = "fresh_hit", "serving cached value");
                    return Ok(value);
                }
                Some((value, EntryState::Stale)) => {
                    counter!(METRIC_HIT_TOTAL, "tier" => tier, "state" => "stale").increment(1);
                    let (_, started) = self.start_or_join(cache, options, get_fresh_value);
                    if started {
                        info!(tier, key, "serving stale value, refreshing in the background");
                    } else {
                        counter!(METRIC_COALESCED_TOTAL, "tier" => tier).increment(1);
                        debug!(tier, key, "serving stale value, refresh already in flight");
                    }
                    return Ok(value);
                }
                Some((_, EntryState::Expired)) => "expired",
                None => "empty",
            }
        };

        counter!(METRIC_MISS_TOTAL, "tier" => tier, "reason" => miss_reason).increment(1);
        let (production, started) = self.start_or_join(cache, options, get_fresh_value);
        if started {
            debug!(tier, key, reason = miss_reason, "waiting for a fresh value");
        } else {
            counter!(METRIC_COALESCED_TOTAL, "tier" => tier).increment(1);
            debug!(tier, key, reason = miss_reason, "joining in-flight production");
        }

        let value = match options.timings {
            Some(timings) => {
                timings
                    .time(
                        format!("getFreshValue:{key}"),
                        format!("request forced to wait for a fresh {key} value"),
                        production,
                    )
                    .await
            }
            None => production.await,
        }?;

        serde_json::from_value(value).map_err(|err| CachifiedError::convert(key, err))
    }

    fn start_or_join<C, V, F, Fut, E>(
        &self,
        cache: &Arc<C>,
        options: &CachifiedOptions<'_>,
        get_fresh_value: F,
    ) -> (Production, bool)
    where
        C: CacheStore + ?Sized + 'static,
        V: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let plan = WritePlan {
            key: options.key.to_string(),
            ttl: options.ttl,
            swr: options.stale_while_revalidate,
            check_value: options.check_value,
        };
        let slot = format!("{}:{}", cache.name(), options.key);
        let production = produce_and_store(Arc::clone(cache), plan, get_fresh_value);
        self.in_flight.join_or_start(slot, options.key, production)
    }
}

/// Read a usable entry; rejected or undecodable entries are deleted.
async fn read_cached<C, V>(
    cache: &C,
    key: &str,
    check_value: Option<CheckValue>,
) -> Option<(V, EntryState)>
where
    C: CacheStore + ?Sized,
    V: DeserializeOwned,
{
    let tier = cache.name();
    let entry = match cache.get(key).await {
        Ok(Some(entry)) => entry,
        Ok(None) => return None,
        Err(err) => {
            warn!(tier, key, error = %err, "cache read failed, treating as miss");
            return None;
        }
    };

    let passes_check = check_value.is_none_or(|check| check(&entry.value));
    let decoded = if passes_check {
        serde_json::from_value::<V>(entry.value).ok()
    } else {
        None
    };

    match decoded {
        Some(value) => Some((value, entry.metadata.state())),
        None => {
            warn!(tier, key, "cached value failed validation, discarding");
            if let Err(err) = cache.delete(key).await {
                warn!(tier, key, error = %err, "could not delete invalid cache entry");
            }
            None
        }
    }
}

async fn produce_and_store<C, V, F, Fut, E>(
    cache: Arc<C>,
    plan: WritePlan,
    get_fresh_value: F,
) -> Result<Value, CachifiedError>
where
    C: CacheStore + ?Sized,
    V: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: Into<BoxError>,
{
    let tier = cache.name();
    let key = plan.key.as_str();
    let started = Instant::now();
    let produced = get_fresh_value().await;
    histogram!(METRIC_FRESH_VALUE_MS, "tier" => tier)
        .record(started.elapsed().as_secs_f64() * 1000.0);

    let value = match produced {
        Ok(value) => value,
        Err(err) => {
            let source: Arc<dyn StdError + Send + Sync> = Arc::from(err.into());
            counter!(METRIC_FRESH_VALUE_FAILED_TOTAL, "tier" => tier).increment(1);
            warn!(tier, key, error = %source, "fresh value production failed");
            return Err(CachifiedError::Produce {
                key: plan.key.clone(),
                source,
            });
        }
    };

    let json = serde_json::to_value(value).map_err(|err| CachifiedError::convert(key, err))?;
    if plan.check_value.is_some_and(|check| !check(&json)) {
        warn!(tier, key, "fresh value failed validation");
        return Err(CachifiedError::Rejected {
            key: plan.key.clone(),
        });
    }

    let metadata = CacheMetadata::created_now(plan.ttl, plan.swr);
    if metadata.total_ttl() == Some(0) {
        debug!(tier, key, "zero lifetime, returning fresh value without caching");
        return Ok(json);
    }

    if let Err(err) = cache.set(key, CacheEntry::new(metadata, json.clone())).await {
        warn!(tier, key, error = %err, "could not write fresh value to cache");
    }
    Ok(json)
}
