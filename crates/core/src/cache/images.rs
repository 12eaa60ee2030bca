//! Image cache CRUD operations.
//!
//! Every operation runs through the handle's [`RetryPolicy`](crate::RetryPolicy),
//! so transient busy errors from concurrent writers are retried before the
//! caller sees `STORE_UNAVAILABLE`. A missing row is not an error.

use std::sync::Arc;

use super::connection::{CacheDb, open_side_connection};
use super::key::ORIGINAL_WIDTH_KEY;
use crate::Error;
use serde::Serialize;
use tokio_rusqlite::{Connection, params};
use tokio_rusqlite::rusqlite::{self, TransactionBehavior};

/// A row to upsert into the image cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub url: String,
    pub width_key: i64,
    /// Canonical parameter string the width key was derived from.
    pub params_key: String,
    pub original_data: Option<Vec<u8>>,
    pub resized_data: Option<Vec<u8>>,
    pub content_type: String,
    pub response_format: String,
}

impl NewEntry {
    /// An original-only entry stored under [`ORIGINAL_WIDTH_KEY`].
    pub fn original(url: impl Into<String>, data: Vec<u8>, content_type: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width_key: ORIGINAL_WIDTH_KEY,
            params_key: String::new(),
            original_data: Some(data),
            resized_data: None,
            content_type: content_type.into(),
            response_format: format.into(),
        }
    }
}

/// Payload returned by a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub data: Vec<u8>,
    pub content_type: String,
    pub format: String,
    pub params_key: String,
}

/// Totals shown on the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size_bytes: u64,
    pub image_count: u64,
}

impl CacheDb {
    /// Look up the payload stored for `(url, width_key)`.
    ///
    /// Key 0 returns the original bytes; any other key returns the resized
    /// bytes. A row whose requested payload column is NULL reads as absent.
    pub async fn get(&self, url: &str, width_key: i64) -> Result<Option<CachedImage>, Error> {
        let url: Arc<str> = Arc::from(url);
        self.retry
            .run("cache.get", || {
                let url = url.clone();
                async move {
                    self.conn
                        .call(move |conn| -> Result<Option<CachedImage>, Error> {
                            let mut stmt = conn.prepare_cached(
                                "SELECT
                                    CASE WHEN ?2 = 0 THEN original_data ELSE resized_data END,
                                    content_type, response_format, params_key
                                FROM image_cache WHERE url = ?1 AND width = ?2
                                LIMIT 1",
                            )?;

                            let result = stmt.query_row(params![url.as_ref(), width_key], |row| {
                                Ok((
                                    row.get::<_, Option<Vec<u8>>>(0)?,
                                    row.get::<_, String>(1)?,
                                    row.get::<_, String>(2)?,
                                    row.get::<_, String>(3)?,
                                ))
                            });

                            match result {
                                Ok((Some(data), content_type, format, params_key)) => {
                                    Ok(Some(CachedImage { data, content_type, format, params_key }))
                                }
                                Ok((None, ..)) => Ok(None),
                                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                                Err(e) => Err(e.into()),
                            }
                        })
                        .await
                        .map_err(Error::from)
                }
            })
            .await
    }

    /// Insert or replace the entry for `(entry.url, entry.width_key)`.
    ///
    /// Replace-on-conflict: the old row is dropped and a fresh one takes a
    /// new id and `created_at`, so the last writer wins and the entry counts
    /// as newest for eviction.
    pub async fn put(&self, entry: NewEntry) -> Result<(), Error> {
        let entry = Arc::new(entry);
        self.retry
            .run("cache.put", || {
                let entry = entry.clone();
                async move {
                    self.conn
                        .call(move |conn| -> Result<(), Error> {
                            conn.execute(
                                "INSERT OR REPLACE INTO image_cache (
                                    url, width, params_key, original_data, resized_data,
                                    content_type, response_format
                                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                                params![
                                    &entry.url,
                                    entry.width_key,
                                    &entry.params_key,
                                    &entry.original_data,
                                    &entry.resized_data,
                                    &entry.content_type,
                                    &entry.response_format,
                                ],
                            )?;
                            Ok(())
                        })
                        .await
                        .map_err(Error::from)
                }
            })
            .await
    }

    /// Store the untransformed upstream bytes under the original key.
    pub async fn put_original(&self, url: &str, data: Vec<u8>, content_type: &str, format: &str) -> Result<(), Error> {
        self.put(NewEntry::original(url, data, content_type, format)).await
    }

    /// Logical size of the database in bytes (`page_count * page_size`).
    pub async fn size(&self) -> Result<u64, Error> {
        self.retry
            .run("cache.size", || async {
                self.conn
                    .call(|conn| -> Result<u64, Error> {
                        let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
                        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
                        Ok((pages * page_size).max(0) as u64)
                    })
                    .await
                    .map_err(Error::from)
            })
            .await
    }

    /// Number of cached rows, originals included.
    pub async fn count(&self) -> Result<u64, Error> {
        self.retry
            .run("cache.count", || async {
                self.conn
                    .call(|conn| -> Result<u64, Error> {
                        let count: i64 = conn.query_row("SELECT COUNT(*) FROM image_cache", [], |row| row.get(0))?;
                        Ok(count as u64)
                    })
                    .await
                    .map_err(Error::from)
            })
            .await
    }

    pub async fn stats(&self) -> Result<CacheStats, Error> {
        Ok(CacheStats { size_bytes: self.size().await?, image_count: self.count().await? })
    }

    /// Delete the oldest half of all entries (at least one if any exist).
    ///
    /// Count and delete share one IMMEDIATE transaction, so the delete
    /// count is never computed against a stale total. Returns the number of
    /// deleted rows.
    pub async fn evict_oldest_half(&self) -> Result<u64, Error> {
        self.retry
            .run("cache.evict", || async {
                self.conn
                    .call(|conn| -> Result<u64, Error> {
                        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                        let total: i64 = tx.query_row("SELECT COUNT(*) FROM image_cache", [], |row| row.get(0))?;
                        if total == 0 {
                            return Ok(0);
                        }

                        let to_delete = (total / 2).max(1);
                        let deleted = tx.execute(
                            "DELETE FROM image_cache WHERE id IN (
                                SELECT id FROM image_cache ORDER BY created_at ASC, id ASC LIMIT ?1
                            )",
                            params![to_delete],
                        )?;

                        tx.commit()?;
                        Ok(deleted as u64)
                    })
                    .await
                    .map_err(Error::from)
            })
            .await
    }

    /// Rebuild the database file to hand freed pages back to the filesystem.
    ///
    /// A file-backed cache vacuums on a connection of its own and closes it
    /// afterwards; the shared connection keeps serving requests meanwhile.
    /// An in-memory cache has nothing to shrink on disk and uses the shared one.
    pub async fn vacuum(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return run_vacuum(&self.conn).await;
        };

        let side = open_side_connection(path).await?;
        let result = run_vacuum(&side).await;
        if let Err(err) = side.close().await {
            tracing::debug!(error = %err, "closing vacuum connection failed");
        }
        result
    }
}

async fn run_vacuum(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch("VACUUM")?;
        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryPolicy;
    use crate::cache::key::width_key;
    use std::time::Duration;

    fn resized(url: &str, width_key: i64, params_key: &str, data: &[u8]) -> NewEntry {
        NewEntry {
            url: url.to_string(),
            width_key,
            params_key: params_key.to_string(),
            original_data: Some(b"original".to_vec()),
            resized_data: Some(data.to_vec()),
            content_type: "image/avif".to_string(),
            response_format: "avif".to_string(),
        }
    }

    async fn urls(db: &CacheDb) -> Vec<String> {
        db.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM image_cache ORDER BY id")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<Result<Vec<String>, _>>()?)
            })
            .await
            .map_err(Error::from)
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(resized("https://example.com/a.jpg", 100, "w_100", b"resized-bytes")).await.unwrap();

        let hit = db.get("https://example.com/a.jpg", 100).await.unwrap().unwrap();
        assert_eq!(hit.data, b"resized-bytes");
        assert_eq!(hit.content_type, "image/avif");
        assert_eq!(hit.format, "avif");
        assert_eq!(hit.params_key, "w_100");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get("https://example.com/none.jpg", 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_original_and_resized_are_independent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let url = "https://example.com/a.png";

        db.put_original(url, b"raw-png".to_vec(), "image/png", "png").await.unwrap();
        db.put(resized(url, 300, "w_300", b"small")).await.unwrap();

        let original = db.get(url, ORIGINAL_WIDTH_KEY).await.unwrap().unwrap();
        assert_eq!(original.data, b"raw-png");
        assert_eq!(original.content_type, "image/png");

        let small = db.get(url, 300).await.unwrap().unwrap();
        assert_eq!(small.data, b"small");
        assert_eq!(db.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_original_only_row_has_no_resized_payload() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let url = "https://example.com/a.png";
        db.put(NewEntry { width_key: 50, ..NewEntry::original(url, b"raw".to_vec(), "image/png", "png") })
            .await
            .unwrap();

        assert!(db.get(url, 50).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_last_writer_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let url = "https://example.com/a.jpg";
        let key = width_key(100, 200, false, "w_100x200");

        db.put(resized(url, key, "w_100x200", b"first")).await.unwrap();
        db.put(resized(url, key, "w_100x200", b"second")).await.unwrap();

        assert_eq!(db.get(url, key).await.unwrap().unwrap().data, b"second");
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_size_is_positive() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.size().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_evict_empty_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(db.evict_oldest_half().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_evict_single_entry_deletes_one() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(resized("https://example.com/only.jpg", 10, "w_10", b"x")).await.unwrap();

        assert_eq!(db.evict_oldest_half().await.unwrap(), 1);
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_evict_removes_oldest_half() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for i in 0..7 {
            db.put(resized(&format!("https://example.com/{i}.jpg"), 100, "w_100", b"x")).await.unwrap();
        }

        let deleted = db.evict_oldest_half().await.unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(
            urls(&db).await,
            vec![
                "https://example.com/3.jpg",
                "https://example.com/4.jpg",
                "https://example.com/5.jpg",
                "https://example.com/6.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn test_rewritten_entry_counts_as_newest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for i in 0..4 {
            db.put(resized(&format!("https://example.com/{i}.jpg"), 100, "w_100", b"x")).await.unwrap();
        }
        db.put(resized("https://example.com/0.jpg", 100, "w_100", b"y")).await.unwrap();

        db.evict_oldest_half().await.unwrap();

        assert_eq!(urls(&db).await, vec!["https://example.com/3.jpg", "https://example.com/0.jpg"]);
    }

    #[tokio::test]
    async fn test_size_non_increasing_after_evict_and_vacuum() {
        let dir = tempfile::tempdir().unwrap();
        let db = CacheDb::open(dir.path().join("cache.db")).await.unwrap();
        for i in 0..20 {
            db.put(resized(&format!("https://example.com/{i}.jpg"), 100, "w_100", &vec![7u8; 16 * 1024]))
                .await
                .unwrap();
        }
        let before = db.size().await.unwrap();

        db.evict_oldest_half().await.unwrap();
        assert!(db.size().await.unwrap() <= before);

        db.vacuum().await.unwrap();
        assert!(db.size().await.unwrap() < before);
    }

    #[tokio::test]
    async fn test_vacuum_alongside_reads() {
        let dir = tempfile::tempdir().unwrap();
        let db = CacheDb::open(dir.path().join("cache.db")).await.unwrap();
        for i in 0..20 {
            db.put(resized(&format!("https://example.com/{i}.jpg"), 100, "w_100", &vec![3u8; 16 * 1024]))
                .await
                .unwrap();
        }
        db.evict_oldest_half().await.unwrap();
        let before = db.size().await.unwrap();

        let (vacuumed, read) = tokio::join!(db.vacuum(), db.get("https://example.com/19.jpg", 100));

        vacuumed.unwrap();
        assert_eq!(read.unwrap().unwrap().data.len(), 16 * 1024);
        assert!(db.size().await.unwrap() < before);
        assert_eq!(db.count().await.unwrap(), 10);
    }

    fn locked_store_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_put_gives_up_while_another_writer_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let db = CacheDb::open(&path).await.unwrap().with_retry(locked_store_policy());
        db.conn.call(|conn| conn.busy_timeout(Duration::from_millis(10))).await.unwrap();

        let other = rusqlite::Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = db.put(resized("https://example.com/a.jpg", 100, "w_100", b"x")).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { attempts: 3, .. }), "{err}");

        other.execute_batch("COMMIT").unwrap();
        db.put(resized("https://example.com/a.jpg", 100, "w_100", b"x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_gives_up_on_closed_store() {
        let db = CacheDb::open_in_memory().await.unwrap().with_retry(locked_store_policy());
        let handle = db.clone();
        db.close().await.unwrap();

        let err = handle.get("https://example.com/a.jpg", 100).await.unwrap_err();

        assert!(matches!(err, Error::StoreUnavailable { attempts: 3, .. }), "{err}");
        assert!(err.is_store_error());
    }
}
