//! SQLite-backed store for original and resized images.
//!
//! Rows are keyed by `(url, width_key)`. Key `0` holds the untransformed
//! upstream bytes; see [`key`] for how other requests map to a key.
//!
//! - Automatic schema migrations
//! - WAL mode with a busy timeout for concurrent access
//! - Bounded retry on every store operation
//! - Size-based eviction of the oldest half of all rows

pub mod connection;
pub mod eviction;
pub mod images;
pub mod key;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use eviction::{EvictionDaemon, EvictionOutcome};
pub use images::{CacheStats, CachedImage, NewEntry};
