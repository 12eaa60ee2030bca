//! Size-bounded eviction daemon for the image cache.
//!
//! Each tick moves through `Idle -> Checking`, then either back to `Idle`
//! when the store is within its ceiling, or through `Evicting -> Vacuuming`
//! when it is over. Eviction drops the oldest half of all rows by insertion
//! time; it knows nothing about read recency. The vacuum is spawned so it
//! never holds up the next tick.
//!
//! # Example
//!
//! ```ignore
//! let daemon = EvictionDaemon::new(cache.clone(), config.max_db_size_bytes())
//!     .with_check_interval(config.eviction_interval());
//! tokio::spawn(daemon.run(shutdown_token.clone()));
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::CacheDb;
use crate::Error;

/// Default interval between size checks (60 seconds).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// What a single check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// Store size was at or under the ceiling.
    WithinLimit { size_bytes: u64 },
    /// Store was over the ceiling and the oldest half was deleted.
    Evicted { size_bytes: u64, deleted: u64 },
}

/// Background daemon that keeps the image cache under a byte ceiling.
pub struct EvictionDaemon {
    cache: CacheDb,
    max_size_bytes: u64,
    check_interval: Duration,
}

impl EvictionDaemon {
    /// Creates a daemon with the default check interval.
    pub fn new(cache: CacheDb, max_size_bytes: u64) -> Self {
        Self { cache, max_size_bytes, check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS) }
    }

    /// Sets a custom check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Run one `Checking` step, evicting if the store is over the ceiling.
    ///
    /// On eviction the vacuum is spawned onto the runtime and not awaited;
    /// its failure is only logged.
    pub async fn check_once(&self) -> Result<EvictionOutcome, Error> {
        let size_bytes = self.cache.size().await?;
        if size_bytes <= self.max_size_bytes {
            debug!(size_bytes, max_size_bytes = self.max_size_bytes, "cache within limit");
            return Ok(EvictionOutcome::WithinLimit { size_bytes });
        }

        info!(size_bytes, max_size_bytes = self.max_size_bytes, "cache over limit, evicting oldest half");
        let deleted = self.cache.evict_oldest_half().await?;
        info!(deleted, "evicted cached images");

        let cache = self.cache.clone();
        tokio::spawn(async move {
            match cache.vacuum().await {
                Ok(()) => match cache.size().await {
                    Ok(after) => info!(size_before = size_bytes, size_after = after, "cache vacuumed"),
                    Err(err) => debug!(error = %err, "could not read size after vacuum"),
                },
                Err(err) => warn!(error = %err, "cache vacuum failed"),
            }
        });

        Ok(EvictionOutcome::Evicted { size_bytes, deleted })
    }

    /// Runs the daemon until shutdown is signalled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            max_size_bytes = self.max_size_bytes,
            "eviction daemon starting"
        );

        let mut interval = tokio::time::interval(self.check_interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("eviction daemon shutting down");
                    break;
                }

                _ = interval.tick() => {
                    if let Err(err) = self.check_once().await {
                        warn!(error = %err, "eviction check failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NewEntry;

    async fn seeded(n: usize) -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        for i in 0..n {
            db.put(NewEntry {
                url: format!("https://example.com/{i}.jpg"),
                width_key: 100,
                params_key: "w_100".into(),
                original_data: None,
                resized_data: Some(vec![1u8; 1024]),
                content_type: "image/jpeg".into(),
                response_format: "jpeg".into(),
            })
            .await
            .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_default_interval() {
        let db = seeded(0).await;
        let daemon = EvictionDaemon::new(db, 1024);
        assert_eq!(daemon.check_interval, Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS));
        assert_eq!(daemon.max_size_bytes(), 1024);
    }

    #[tokio::test]
    async fn test_within_limit_keeps_everything() {
        let db = seeded(4).await;
        let daemon = EvictionDaemon::new(db.clone(), u64::MAX);

        let outcome = daemon.check_once().await.unwrap();

        assert!(matches!(outcome, EvictionOutcome::WithinLimit { .. }));
        assert_eq!(db.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_over_limit_evicts_half() {
        let db = seeded(10).await;
        let daemon = EvictionDaemon::new(db.clone(), 0);

        let outcome = daemon.check_once().await.unwrap();

        assert!(matches!(outcome, EvictionOutcome::Evicted { deleted: 5, .. }));
        assert_eq!(db.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_over_limit_single_entry() {
        let db = seeded(1).await;
        let daemon = EvictionDaemon::new(db.clone(), 0);

        let outcome = daemon.check_once().await.unwrap();

        assert!(matches!(outcome, EvictionOutcome::Evicted { deleted: 1, .. }));
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let db = seeded(0).await;
        let token = CancellationToken::new();
        let daemon = EvictionDaemon::new(db, u64::MAX).with_check_interval(Duration::from_secs(1));

        let handle = tokio::spawn(daemon.run(token.clone()));
        token.cancel();

        handle.await.unwrap();
    }
}
