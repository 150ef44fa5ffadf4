//! Cache entry shape shared by every tier.
//!
//! Entries are stored as JSON so the memory and durable tiers hold the same
//! logical record under the same key. Durations are kept in milliseconds and
//! `None` means unbounded, which serializes as `null`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Lifetime bookkeeping written once, when the value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Unix timestamp in milliseconds.
    pub created_time: i64,
    /// Freshness window in milliseconds; `None` never goes stale.
    pub ttl: Option<u64>,
    /// Stale-while-revalidate window in milliseconds; `None` is unbounded.
    /// Records written without the field get no stale window.
    #[serde(default = "no_stale_window")]
    pub swr: Option<u64>,
}

/// How a cached entry may be used at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Expired,
}

impl CacheMetadata {
    pub fn new(created_time: i64, ttl: Option<Duration>, swr: Option<Duration>) -> Self {
        Self {
            created_time,
            ttl: ttl.map(duration_ms),
            swr: swr.map(duration_ms),
        }
    }

    /// Metadata stamped with the current wall-clock time.
    pub fn created_now(ttl: Option<Duration>, swr: Option<Duration>) -> Self {
        Self::new(now_ms(), ttl, swr)
    }

    /// `ttl + swr`, or `None` when either side is unbounded.
    pub fn total_ttl(&self) -> Option<u64> {
        Some(self.ttl?.saturating_add(self.swr?))
    }

    /// Instant (unix ms) after which the entry must not be served at all.
    pub fn expires_at(&self) -> Option<i64> {
        let total = i64::try_from(self.total_ttl()?).unwrap_or(i64::MAX);
        Some(self.created_time.saturating_add(total))
    }

    pub fn state_at(&self, now: i64) -> EntryState {
        let Some(ttl) = self.ttl else {
            return EntryState::Fresh;
        };
        let valid_until = self
            .created_time
            .saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX));
        if now <= valid_until {
            return EntryState::Fresh;
        }

        let Some(swr) = self.swr else {
            return EntryState::Stale;
        };
        let stale_until = valid_until.saturating_add(i64::try_from(swr).unwrap_or(i64::MAX));
        if now <= stale_until {
            EntryState::Stale
        } else {
            EntryState::Expired
        }
    }

    pub fn state(&self) -> EntryState {
        self.state_at(now_ms())
    }
}

/// A cached value together with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: CacheMetadata,
    pub value: Value,
}

impl CacheEntry {
    pub fn new(metadata: CacheMetadata, value: Value) -> Self {
        Self { metadata, value }
    }
}

fn no_stale_window() -> Option<u64> {
    Some(0)
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 60_000;
    const SWR: u64 = 30_000;

    fn metadata(ttl: Option<u64>, swr: Option<u64>) -> CacheMetadata {
        CacheMetadata {
            created_time: 1_000_000,
            ttl,
            swr,
        }
    }

    #[test]
    fn fresh_until_ttl_elapses() {
        let meta = metadata(Some(T), Some(SWR));
        assert_eq!(meta.state_at(1_000_000 + T as i64 - 1), EntryState::Fresh);
        assert_eq!(meta.state_at(1_000_000 + T as i64), EntryState::Fresh);
    }

    #[test]
    fn stale_inside_swr_window() {
        let meta = metadata(Some(T), Some(SWR));
        assert_eq!(meta.state_at(1_000_000 + T as i64 + 1), EntryState::Stale);
    }

    #[test]
    fn expired_past_swr_window() {
        let meta = metadata(Some(T), Some(SWR));
        assert_eq!(
            meta.state_at(1_000_000 + (T + SWR) as i64 + 1),
            EntryState::Expired
        );
    }

    #[test]
    fn unbounded_ttl_never_goes_stale() {
        let meta = metadata(None, Some(0));
        assert_eq!(meta.state_at(i64::MAX), EntryState::Fresh);
        assert_eq!(meta.total_ttl(), None);
        assert_eq!(meta.expires_at(), None);
    }

    #[test]
    fn unbounded_swr_keeps_serving_stale() {
        let meta = metadata(Some(T), None);
        assert_eq!(meta.state_at(i64::MAX), EntryState::Stale);
        assert_eq!(meta.expires_at(), None);
    }

    #[test]
    fn expiry_is_created_plus_total_ttl() {
        let meta = metadata(Some(T), Some(SWR));
        assert_eq!(meta.total_ttl(), Some(T + SWR));
        assert_eq!(meta.expires_at(), Some(1_000_000 + (T + SWR) as i64));
    }

    #[test]
    fn metadata_serializes_with_null_for_unbounded() {
        let meta = CacheMetadata::new(42, None, Some(Duration::from_secs(1)));
        let json = serde_json::to_value(meta).expect("serialize metadata");
        assert_eq!(
            json,
            serde_json::json!({ "createdTime": 42, "ttl": null, "swr": 1000 })
        );
    }

    #[test]
    fn missing_swr_field_means_no_stale_window() {
        let meta: CacheMetadata =
            serde_json::from_str(r#"{"createdTime":1,"ttl":5}"#).expect("parse metadata");
        assert_eq!(meta.swr, Some(0));

        let meta: CacheMetadata = serde_json::from_str(r#"{"createdTime":1,"ttl":5,"swr":null}"#)
            .expect("parse metadata");
        assert_eq!(meta.swr, None);
    }
}
