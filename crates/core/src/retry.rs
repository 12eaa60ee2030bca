//! Bounded retry with fixed backoff for store operations.
//!
//! SQLite is effectively single-writer; concurrent writers can briefly see
//! `SQLITE_BUSY`. Store operations run through a [`RetryPolicy`] so those
//! transient conditions are absorbed instead of surfacing as failures.
//! Sleeping goes through `tokio::time`, so tests drive it with a paused clock.

use std::future::Future;
use std::time::Duration;

use crate::Error;

/// Default number of attempts per store operation.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_ATTEMPTS, delay: DEFAULT_DELAY }
    }
}

impl RetryPolicy {
    /// Create a policy. `attempts` is clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts: attempts.max(1), delay }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, returns a non-store error, or attempts run out.
    ///
    /// Only store errors are retried. Exhaustion yields
    /// [`Error::StoreUnavailable`] wrapping the last failure.
    pub async fn run<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_store_error() => return Err(err),
                Err(err) if attempt >= self.attempts => {
                    return Err(Error::StoreUnavailable { attempts: attempt, source: Box::new(err) });
                }
                Err(err) => {
                    tracing::debug!(op = op_name, attempt, error = %err, "store busy, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_rusqlite::rusqlite;

    fn busy() -> Error {
        Error::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        ))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .run("test", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 { Err(busy()) } else { Ok(42) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_store_unavailable() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), Error> = RetryPolicy::default()
            .run("test", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(busy())
                }
            })
            .await;

        assert!(matches!(result, Err(Error::StoreUnavailable { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_store_errors_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), Error> = RetryPolicy::default()
            .run("test", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::EmptyBody)
                }
            })
            .await;

        assert!(matches!(result, Err(Error::EmptyBody)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
