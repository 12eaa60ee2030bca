//! HTTP handlers.
//!
//! - `resize`: the image endpoint (`/resize`, `/r`, `/r/...`)
//! - `config`: stats JSON and the domain gate toggle

pub mod config;
pub mod resize;
