//! Core types and shared functionality for the image resize service.
//!
//! This crate provides:
//! - Image cache store with SQLite backend and size-bounded eviction
//! - Referer tracking and per-domain gating
//! - Retry policy for busy-store conditions
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod referer;
pub mod retry;

pub use cache::{CacheDb, CacheStats, CachedImage, EvictionDaemon, EvictionOutcome, NewEntry};
pub use config::AppConfig;
pub use error::Error;
pub use referer::{DomainStat, RefererDb, RefererStat};
pub use retry::RetryPolicy;
