//! SQLite-backed durable tier.
//!
//! One table holds `{key, metadata, value}` rows with metadata and value
//! serialized independently as JSON text. The tier survives restarts and may
//! be shared by several processes; concurrent writers resolve last-write-wins.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use tracing::{error, info};

use super::{
    entry::{CacheEntry, CacheMetadata},
    store::{CacheError, CacheStore},
};

const TIER: &str = "sqlite";
const MAX_CONNECTIONS: u32 = 4;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cache (\
    key TEXT PRIMARY KEY NOT NULL, \
    metadata TEXT NOT NULL, \
    value TEXT NOT NULL\
)";
const SELECT_ENTRY: &str = "SELECT metadata, value FROM cache WHERE key = ?";
const UPSERT_ENTRY: &str = "INSERT INTO cache (key, metadata, value) VALUES (?, ?, ?) \
    ON CONFLICT(key) DO UPDATE SET metadata = excluded.metadata, value = excluded.value";
const DELETE_ENTRY: &str = "DELETE FROM cache WHERE key = ?";
const SELECT_KEYS: &str = "SELECT key FROM cache ORDER BY rowid LIMIT ?";
const SEARCH_KEYS: &str = "SELECT key FROM cache WHERE instr(key, ?) > 0 ORDER BY rowid LIMIT ?";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open the cache database, recreating it from scratch once if it is
    /// unreadable. A second failure is returned to the caller.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;

        let pool = match connect(&path).await {
            Ok(pool) => pool,
            Err(first) => {
                error!(
                    tier = TIER,
                    path = %path.display(),
                    error = %first,
                    "Error creating cache database, deleting the file and trying again"
                );
                remove_database_file(&path).await?;
                connect(&path).await.map_err(|second| {
                    CacheError::storage(
                        TIER,
                        format!(
                            "cache database `{}` could not be recreated: {second}",
                            path.display()
                        ),
                    )
                })?
            }
        };

        info!(tier = TIER, path = %path.display(), "cache database ready");
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Up to `limit` keys in insertion order.
    pub async fn keys(&self, limit: u32) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query(SELECT_KEYS)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        collect_keys(rows)
    }

    /// Up to `limit` keys containing `query`, compared case-sensitively.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query(SEARCH_KEYS)
            .bind(query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        collect_keys(rows)
    }

    pub async fn health_check(&self) -> Result<(), CacheError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(storage_error)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(SELECT_ENTRY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let metadata: String = row.try_get("metadata").map_err(storage_error)?;
        let value: String = row.try_get("value").map_err(storage_error)?;
        let decode = |source| CacheError::Decode {
            key: key.to_string(),
            source,
        };

        Ok(Some(CacheEntry {
            metadata: serde_json::from_str::<CacheMetadata>(&metadata).map_err(decode)?,
            value: serde_json::from_str(&value).map_err(decode)?,
        }))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let metadata = serde_json::to_string(&entry.metadata).map_err(CacheError::Encode)?;
        let value = serde_json::to_string(&entry.value).map_err(CacheError::Encode)?;
        sqlx::query(UPSERT_ENTRY)
            .bind(key)
            .bind(metadata)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query(DELETE_ENTRY)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

async fn connect(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    if let Err(err) = sqlx::query(CREATE_TABLE).execute(&pool).await {
        pool.close().await;
        return Err(err);
    }
    Ok(pool)
}

async fn ensure_parent_dir(path: &Path) -> Result<(), CacheError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| {
                CacheError::storage(
                    TIER,
                    format!("cannot create cache directory `{}`: {err}", dir.display()),
                )
            }),
        _ => Ok(()),
    }
}

async fn remove_database_file(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CacheError::storage(
            TIER,
            format!("cannot delete cache database `{}`: {err}", path.display()),
        )),
    }
}

fn collect_keys(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<String>, CacheError> {
    rows.into_iter()
        .map(|row| row.try_get::<String, _>("key").map_err(storage_error))
        .collect()
}

fn storage_error(err: sqlx::Error) -> CacheError {
    CacheError::storage(TIER, err.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::cache::entry::now_ms;

    async fn open_temp() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SqliteStore::open(dir.path().join("cache.db"))
            .await
            .expect("open cache db");
        (dir, store)
    }

    fn entry(value: serde_json::Value) -> CacheEntry {
        CacheEntry::new(
            CacheMetadata {
                created_time: now_ms(),
                ttl: Some(3_600_000),
                swr: None,
            },
            value,
        )
    }

    #[tokio::test]
    async fn unknown_key_is_absent() {
        let (_dir, store) = open_temp().await;
        assert!(store.get("content:none").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn roundtrip_is_lossless() {
        let (_dir, store) = open_temp().await;
        let original = entry(json!([{ "title": "Ray marcher", "tags": ["gpu"] }, 3.5, null]));

        store.set("content:projects", original.clone()).await.expect("set");
        assert_eq!(
            store.get("content:projects").await.expect("get"),
            Some(original)
        );
    }

    #[tokio::test]
    async fn set_replaces_and_repeats_are_idempotent() {
        let (_dir, store) = open_temp().await;
        store.set("k", entry(json!(1))).await.expect("set 1");
        let second = entry(json!(2));
        store.set("k", second.clone()).await.expect("set 2");
        store.set("k", second.clone()).await.expect("set 2 again");

        assert_eq!(store.get("k").await.expect("get"), Some(second));
        assert_eq!(store.keys(10).await.expect("keys"), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn delete_of_absent_key_is_a_no_op() {
        let (_dir, store) = open_temp().await;
        store.delete("missing").await.expect("delete missing");
        store.set("k", entry(json!(1))).await.expect("set");
        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn search_returns_matching_keys_in_enumeration_order() {
        let (_dir, store) = open_temp().await;
        for key in ["content:projects", "content:talks", "user:1"] {
            store.set(key, entry(json!(key))).await.expect("set");
        }

        assert_eq!(
            store.search("content", 100).await.expect("search"),
            vec!["content:projects".to_string(), "content:talks".to_string()]
        );
        assert!(store.search("CONTENT", 100).await.expect("search").is_empty());
        assert_eq!(store.search("content", 1).await.expect("search").len(), 1);
    }

    #[tokio::test]
    async fn keys_respect_limit() {
        let (_dir, store) = open_temp().await;
        for index in 0..5 {
            store
                .set(&format!("key:{index}"), entry(json!(index)))
                .await
                .expect("set");
        }
        assert_eq!(
            store.keys(3).await.expect("keys"),
            vec!["key:0".to_string(), "key:1".to_string(), "key:2".to_string()]
        );
    }

    #[tokio::test]
    async fn corrupt_database_is_recreated_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("cache.db");
        tokio::fs::create_dir_all(path.parent().expect("parent"))
            .await
            .expect("create dir");
        tokio::fs::write(&path, vec![0x42_u8; 8192])
            .await
            .expect("write garbage");

        let store = SqliteStore::open(&path).await.expect("recreated store");
        store.set("k", entry(json!(true))).await.expect("set");
        assert!(store.get("k").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn unrecoverable_location_fails_after_one_retry() {
        let dir = tempfile::tempdir().expect("temp dir");
        // A directory where the database file should be cannot be opened or deleted as a file.
        let path = dir.path().join("cache.db");
        tokio::fs::create_dir_all(&path).await.expect("create dir");

        assert!(SqliteStore::open(&path).await.is_err());
    }
}
