//! Database schema migrations.
//!
//! Uses a simple version table approach to track applied migrations.
//! The image cache and the referer tracker live in separate database files,
//! so each has its own migration list.

use std::num::ParseIntError;

use super::Error;
use tokio_rusqlite::{Connection, params};

/// A migration: (version, SQL).
pub type Migration = (&'static str, &'static str);

/// Image cache schema.
pub const IMAGE_CACHE: &[Migration] = &[
    ("1", include_str!("../../migrations/001_image_cache.sql")),
    ("2", include_str!("../../migrations/002_image_cache_params_key.sql")),
];

/// Referer tracking schema.
pub const REFERER: &[Migration] = &[
    ("1", include_str!("../../migrations/101_referer_tracking.sql")),
    ("2", include_str!("../../migrations/102_referer_disabled.sql")),
];

/// Run any pending migrations from `migrations`.
///
/// This creates the _migrations table if it doesn't exist, checks the
/// current version, and applies any migrations that haven't been run yet.
///
/// # Errors
///
/// Returns an error if a migration SQL fails to execute.
pub async fn run(conn: &Connection, migrations: &'static [Migration]) -> Result<(), Error> {
    conn.call(move |conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
            .map_err(Error::from)?;

        for (version, sql) in migrations {
            let version_num: i64 =
                version.parse().map_err(|e: ParseIntError| Error::MigrationFailed(e.to_string()))?;
            if version_num > current {
                conn.execute_batch(sql).map_err(|e| Error::MigrationFailed(format!("v{version_num}: {e}")))?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version_num, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(Error::from)?;
            }
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_exists(conn: &Connection, name: &'static str) -> bool {
        conn.call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                params![name],
                |row| row.get(0),
            )
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn, IMAGE_CACHE).await.unwrap();
        run(&conn, IMAGE_CACHE).await.unwrap();

        assert!(table_exists(&conn, "image_cache").await);
        assert!(!table_exists(&conn, "referer_tracking").await);
    }

    #[tokio::test]
    async fn test_migrations_version_tracking() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn, REFERER).await.unwrap();

        let count: i64 = conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0)))
            .await
            .unwrap();

        assert_eq!(count, REFERER.len() as i64);
        assert!(table_exists(&conn, "referer_tracking").await);
    }

    #[tokio::test]
    async fn test_later_migration_adds_column() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn, IMAGE_CACHE).await.unwrap();

        let has_params_key: bool = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM pragma_table_info('image_cache') WHERE name = 'params_key')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();

        assert!(has_params_key);
    }
}
