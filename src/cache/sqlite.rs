//! SQLite-backed persistent store.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::backend::CacheBackend;
use super::key::CacheKey;
use crate::Result;

/// Persistent key-value store in a single SQLite file.
///
/// Every write is committed on its own, so entries from completed sub-batches
/// survive a later failure in the same query.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;",
        )?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key         TEXT PRIMARY KEY,
                value       BLOB NOT NULL,
                created_at  INTEGER NOT NULL DEFAULT (strftime('%s','now'))
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl CacheBackend for SqliteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().await;
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key.hash],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value) VALUES (?1, ?2)",
            params![key.hash, value],
        )?;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite");
        let key = CacheKey::new("deadbeef");

        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.set(&key, br#"{"a":1}"#).await.unwrap();
            assert_eq!(cache.len().await.unwrap(), 1);
        }

        let reopened = SqliteCache::open(&path).unwrap();
        assert_eq!(
            reopened.get(&key).await.unwrap().as_deref(),
            Some(&br#"{"a":1}"#[..])
        );
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn test_overwrite_keeps_single_row() {
        let cache = SqliteCache::open_in_memory().unwrap();
        let key = CacheKey::new("k");
        tokio_test::block_on(async {
            cache.set(&key, b"first").await.unwrap();
            cache.set(&key, b"second").await.unwrap();
            assert_eq!(cache.len().await.unwrap(), 1);
            assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some(&b"second"[..]));
        });
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let cache = SqliteCache::open_in_memory().unwrap();
        assert!(cache.get(&CacheKey::new("nope")).await.unwrap().is_none());
        assert_eq!(cache.name(), "sqlite");
    }
}
