//! Database connection management with pragma configuration.
//!
//! This module handles opening SQLite databases, applying the pragmas both
//! stores need for concurrent access (WAL, busy timeout), and running
//! migrations.

use super::migrations::{self, Migration};
use crate::{Error, RetryPolicy};
use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA busy_timeout=5000;";

/// Open (creating if needed) a database file and bring its schema up to date.
///
/// Missing parent directories are created.
pub(crate) async fn open_connection(path: &Path, migrations: &'static [Migration]) -> Result<Connection, Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
    prepare(&conn, migrations).await?;
    Ok(conn)
}

/// Open an in-memory database with the same pragmas and schema.
pub(crate) async fn open_memory_connection(migrations: &'static [Migration]) -> Result<Connection, Error> {
    let conn = Connection::open_in_memory().await.map_err(|e| Error::Database(e.into()))?;
    prepare(&conn, migrations).await?;
    Ok(conn)
}

/// Open a second connection to an existing file for maintenance work.
///
/// Only pragmas are applied; the schema is already in place.
pub(crate) async fn open_side_connection(path: &Path) -> Result<Connection, Error> {
    let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
    conn.call(|conn| conn.execute_batch(PRAGMAS)).await.map_err(Error::Database)?;
    Ok(conn)
}

async fn prepare(conn: &Connection, migrations: &'static [Migration]) -> Result<(), Error> {
    conn.call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
    })
    .await
    .map_err(Error::Database)?;

    migrations::run(conn, migrations).await
}

/// Image cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Cloning is cheap and shares the connection,
/// so every clone funnels into the same single writer. File-backed caches
/// remember their path so maintenance can run on its own connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    pub(crate) path: Option<PathBuf>,
    pub(crate) retry: RetryPolicy,
}

impl CacheDb {
    /// Open the image cache at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = open_connection(path.as_ref(), migrations::IMAGE_CACHE).await?;
        tracing::info!(path = %path.as_ref().display(), "image cache opened");
        Ok(Self { conn, path: Some(path.as_ref().to_path_buf()), retry: RetryPolicy::default() })
    }

    /// Open an in-memory image cache for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = open_memory_connection(migrations::IMAGE_CACHE).await?;
        Ok(Self { conn, path: None, retry: RetryPolicy::default() })
    }

    /// Replace the retry policy used for every store operation.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Close the shared connection.
    ///
    /// Every clone uses the same connection, so clones still alive get
    /// store errors from here on.
    pub async fn close(self) -> Result<(), Error> {
        self.conn.close().await.map_err(Error::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let version = db
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("image_cache.db");

        CacheDb::open(&path).await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_with_retry() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let db = CacheDb::open_in_memory().await.unwrap().with_retry(policy);
        assert_eq!(db.retry, policy);
    }

    #[tokio::test]
    async fn test_close_fails_remaining_clones() {
        let db = CacheDb::open_in_memory().await.unwrap().with_retry(RetryPolicy::new(2, Duration::from_millis(1)));
        let handle = db.clone();

        db.close().await.unwrap();

        let err = handle.count().await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { attempts: 2, .. }), "{err}");
    }

    #[tokio::test]
    async fn test_side_connection_sees_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image_cache.db");
        let db = CacheDb::open(&path).await.unwrap();
        db.put_original("https://example.com/a.jpg", vec![1, 2, 3], "image/jpeg", "jpeg").await.unwrap();

        let side = open_side_connection(&path).await.unwrap();
        let rows = side
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM image_cache", [], |row| row.get::<_, i64>(0)))
            .await
            .unwrap();

        assert_eq!(rows, 1);
        assert_eq!(db.path.as_deref(), Some(path.as_path()));
    }
}
