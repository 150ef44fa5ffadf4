//! The capability set shared by both cache tiers.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use thiserror::Error;

use super::entry::CacheEntry;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error in `{tier}`: {message}")]
    Storage { tier: &'static str, message: String },
    #[error("cache record `{key}` could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache entry could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Unknown cache type: {0}")]
    UnknownTier(String),
}

impl CacheError {
    pub fn storage(tier: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            tier,
            message: message.into(),
        }
    }
}

/// Key/value access every cache tier provides.
///
/// The orchestrator is generic over this trait and never knows which tier it
/// reads from.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Human-readable tier name, also used to namespace in-flight productions.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Tier selector used by the administrative surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Sqlite,
    Lru,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Sqlite => "sqlite",
            Tier::Lru => "lru",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sqlite" => Ok(Tier::Sqlite),
            "lru" => Ok(Tier::Lru),
            other => Err(CacheError::UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tiers() {
        assert_eq!("sqlite".parse::<Tier>().expect("sqlite tier"), Tier::Sqlite);
        assert_eq!("lru".parse::<Tier>().expect("lru tier"), Tier::Lru);
    }

    #[test]
    fn unknown_tier_is_an_error_with_its_name() {
        let err = "redis".parse::<Tier>().expect_err("unknown tier");
        assert_eq!(err.to_string(), "Unknown cache type: redis");
    }

    #[test]
    fn tier_names_are_case_sensitive() {
        assert!("SQLite".parse::<Tier>().is_err());
    }
}
