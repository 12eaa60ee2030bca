//! Everything that touches upstream image bytes.
//!
//! This crate provides source URL normalization, the HTTP fetcher, the
//! resize engine, the format encoder, and the placeholder graphic used by
//! the server's request pipeline.

pub mod fetch;
pub mod imaging;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, Fetcher, normalize_source};
pub use imaging::{Directives, Encoded, FormatEncoder, ModernEncoder, OutputFormat, ResizeParams, render};
