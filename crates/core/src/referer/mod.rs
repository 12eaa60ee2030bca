//! Per-domain referer counters and the domain gate.
//!
//! One row per `(base_domain, date)` holds that day's request count and the
//! domain's disabled flag. The flag is domain-wide: every row of a domain
//! carries the same value, new day rows inherit it, and a toggle rewrites
//! all of them.

mod domain;

pub use domain::{DIRECT, HIDDEN, UNKNOWN, extract_domain, is_sentinel};

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio_rusqlite::rusqlite::{self, TransactionBehavior, types::Type};
use tokio_rusqlite::{Connection, params};

use crate::cache::connection::{open_connection, open_memory_connection};
use crate::cache::migrations;
use crate::{Error, RetryPolicy};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Totals for one domain across all days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStat {
    pub domain: String,
    pub total_requests: u64,
    pub disabled: bool,
}

/// One domain's count on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefererStat {
    pub domain: String,
    pub date: NaiveDate,
    pub requests: u64,
}

/// Referer tracking database handle.
///
/// Lives in its own SQLite file so tracking rows never count toward the
/// image cache size.
#[derive(Clone, Debug)]
pub struct RefererDb {
    conn: Connection,
    retry: RetryPolicy,
}

impl RefererDb {
    /// Open the referer database at the specified path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = open_connection(path.as_ref(), migrations::REFERER).await?;
        tracing::info!(path = %path.as_ref().display(), "referer database opened");
        Ok(Self { conn, retry: RetryPolicy::default() })
    }

    /// Open an in-memory referer database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = open_memory_connection(migrations::REFERER).await?;
        Ok(Self { conn, retry: RetryPolicy::default() })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Count one request from `referer` against today's row.
    ///
    /// Returns the domain the request was counted under.
    pub async fn track(&self, referer: &str) -> Result<String, Error> {
        let domain = extract_domain(referer);
        self.record_visit(&domain, Utc::now().date_naive()).await?;
        Ok(domain)
    }

    /// Increment the counter for `(domain, date)`, creating the row if needed.
    pub async fn record_visit(&self, domain: &str, date: NaiveDate) -> Result<(), Error> {
        let domain: Arc<str> = Arc::from(domain);
        let date = date.format(DATE_FORMAT).to_string();
        self.retry
            .run("referer.record_visit", || {
                let domain = domain.clone();
                let date = date.clone();
                async move {
                    self.conn
                        .call(move |conn| -> Result<(), Error> {
                            conn.execute(
                                "INSERT INTO referer_tracking (base_domain, date_requested, request_count, is_disabled)
                                VALUES (
                                    ?1, ?2, 1,
                                    COALESCE((SELECT MAX(is_disabled) FROM referer_tracking WHERE base_domain = ?1), 0)
                                )
                                ON CONFLICT(base_domain, date_requested)
                                DO UPDATE SET request_count = request_count + 1",
                                params![domain.as_ref(), date],
                            )?;
                            Ok(())
                        })
                        .await
                        .map_err(Error::from)
                }
            })
            .await
    }

    /// Whether any row for `domain` is disabled. Unseen domains are enabled.
    pub async fn is_disabled(&self, domain: &str) -> Result<bool, Error> {
        let domain: Arc<str> = Arc::from(domain);
        self.retry
            .run("referer.is_disabled", || {
                let domain = domain.clone();
                async move {
                    self.conn
                        .call(move |conn| -> Result<bool, Error> {
                            let disabled: i64 = conn.query_row(
                                "SELECT COALESCE(MAX(is_disabled), 0) FROM referer_tracking WHERE base_domain = ?1",
                                params![domain.as_ref()],
                                |row| row.get(0),
                            )?;
                            Ok(disabled != 0)
                        })
                        .await
                        .map_err(Error::from)
                }
            })
            .await
    }

    /// Flip the disabled flag on every row of `domain`.
    ///
    /// Returns the domain's state after the flip. A domain with no rows is
    /// left untouched and reports `false`. Callers reject sentinel domains
    /// before getting here.
    pub async fn toggle_disabled(&self, domain: &str) -> Result<bool, Error> {
        let domain: Arc<str> = Arc::from(domain);
        self.retry
            .run("referer.toggle_disabled", || {
                let domain = domain.clone();
                async move {
                    self.conn
                        .call(move |conn| -> Result<bool, Error> {
                            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                            let current: Option<i64> = tx.query_row(
                                "SELECT MAX(is_disabled) FROM referer_tracking WHERE base_domain = ?1",
                                params![domain.as_ref()],
                                |row| row.get(0),
                            )?;

                            let Some(current) = current else {
                                return Ok(false);
                            };

                            let next = current == 0;
                            tx.execute(
                                "UPDATE referer_tracking SET is_disabled = ?2 WHERE base_domain = ?1",
                                params![domain.as_ref(), next],
                            )?;
                            tx.commit()?;
                            Ok(next)
                        })
                        .await
                        .map_err(Error::from)
                }
            })
            .await
    }

    /// Per-domain totals, busiest first.
    pub async fn aggregated_stats(&self) -> Result<Vec<DomainStat>, Error> {
        self.retry
            .run("referer.aggregated_stats", || async {
                self.conn
                    .call(|conn| -> Result<Vec<DomainStat>, Error> {
                        let mut stmt = conn.prepare_cached(
                            "SELECT base_domain, SUM(request_count) AS total, MAX(is_disabled)
                            FROM referer_tracking
                            GROUP BY base_domain
                            ORDER BY total DESC, base_domain ASC",
                        )?;
                        let rows = stmt.query_map([], |row| {
                            Ok(DomainStat {
                                domain: row.get(0)?,
                                total_requests: row.get::<_, i64>(1)?.max(0) as u64,
                                disabled: row.get::<_, i64>(2)? != 0,
                            })
                        })?;
                        Ok(rows.collect::<Result<Vec<_>, _>>()?)
                    })
                    .await
                    .map_err(Error::from)
            })
            .await
    }

    /// Per-day rows with `start <= date <= end`, newest day first.
    pub async fn stats_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RefererStat>, Error> {
        let start = start.format(DATE_FORMAT).to_string();
        let end = end.format(DATE_FORMAT).to_string();
        self.retry
            .run("referer.stats_between", || {
                let (start, end) = (start.clone(), end.clone());
                async move {
                    self.conn
                        .call(move |conn| -> Result<Vec<RefererStat>, Error> {
                            let mut stmt = conn.prepare_cached(
                                "SELECT base_domain, date_requested, request_count
                                FROM referer_tracking
                                WHERE date_requested BETWEEN ?1 AND ?2
                                ORDER BY date_requested DESC, request_count DESC, base_domain ASC",
                            )?;
                            let rows = stmt.query_map(params![start, end], |row| {
                                let raw: String = row.get(1)?;
                                let date = NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
                                Ok(RefererStat {
                                    domain: row.get(0)?,
                                    date,
                                    requests: row.get::<_, i64>(2)?.max(0) as u64,
                                })
                            })?;
                            Ok(rows.collect::<Result<Vec<_>, _>>()?)
                        })
                        .await
                        .map_err(Error::from)
                }
            })
            .await
    }
}
