//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RESIZER_*)
//! 2. Legacy unprefixed variables (PORT, QUALITY, MAX_DB_SIZE, MAX_AGE)
//! 3. TOML config file (if RESIZER_CONFIG_FILE set)
//! 4. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::RetryPolicy;

mod validation;

pub use validation::ConfigError;

/// Unprefixed variables honoured for compatibility with older deployments.
const LEGACY_ENV: [&str; 4] = ["PORT", "QUALITY", "MAX_DB_SIZE", "MAX_AGE"];

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RESIZER_*)
/// 2. Legacy unprefixed variables
/// 3. TOML config file (if RESIZER_CONFIG_FILE set)
/// 4. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address to bind the HTTP listener to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    ///
    /// Set via RESIZER_PORT or PORT.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the image cache database.
    #[serde(default = "default_cache_db_path")]
    pub cache_db_path: PathBuf,

    /// Path to the referer tracking database.
    #[serde(default = "default_referer_db_path")]
    pub referer_db_path: PathBuf,

    /// Image cache ceiling in megabytes.
    ///
    /// Set via RESIZER_MAX_DB_SIZE or MAX_DB_SIZE.
    #[serde(default = "default_max_db_size")]
    pub max_db_size: u64,

    /// Encoder quality, 10 to 100.
    ///
    /// Set via RESIZER_QUALITY or QUALITY.
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// `Cache-Control: max-age` advertised on image responses, in seconds.
    ///
    /// Set via RESIZER_MAX_AGE or MAX_AGE.
    #[serde(default = "default_max_age")]
    pub max_age: u64,

    /// Upstream fetch timeout in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum upstream body size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Optional clamp applied to requested width and height.
    #[serde(default)]
    pub max_dimension: Option<u32>,

    /// Largest pixel buffer a single resize may allocate.
    #[serde(default = "default_max_output_pixels")]
    pub max_output_pixels: u64,

    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// Attempts per store operation before giving up.
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,

    #[serde(default = "default_store_retry_delay_ms")]
    pub store_retry_delay_ms: u64,

    /// AVIF encoder speed, 1 (slowest) to 10 (fastest).
    #[serde(default = "default_encoder_speed")]
    pub encoder_speed: u8,

    /// Capacity of the background write queue.
    #[serde(default = "default_task_queue_capacity")]
    pub task_queue_capacity: usize,

    /// User-Agent sent to upstream servers.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_cache_db_path() -> PathBuf {
    PathBuf::from("tmp/image_cache.db")
}

fn default_referer_db_path() -> PathBuf {
    PathBuf::from("tmp/http_refers.db")
}

fn default_max_db_size() -> u64 {
    1000
}

fn default_quality() -> u8 {
    90
}

fn default_max_age() -> u64 {
    86_400
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_max_bytes() -> usize {
    52_428_800 // 50MB
}

fn default_max_output_pixels() -> u64 {
    40_000_000
}

fn default_eviction_interval_secs() -> u64 {
    60
}

fn default_store_retry_attempts() -> u32 {
    3
}

fn default_store_retry_delay_ms() -> u64 {
    50
}

fn default_encoder_speed() -> u8 {
    8
}

fn default_task_queue_capacity() -> usize {
    1024
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/119.0".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache_db_path: default_cache_db_path(),
            referer_db_path: default_referer_db_path(),
            max_db_size: default_max_db_size(),
            quality: default_quality(),
            max_age: default_max_age(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_dimension: None,
            max_output_pixels: default_max_output_pixels(),
            eviction_interval_secs: default_eviction_interval_secs(),
            store_retry_attempts: default_store_retry_attempts(),
            store_retry_delay_ms: default_store_retry_delay_ms(),
            encoder_speed: default_encoder_speed(),
            task_queue_capacity: default_task_queue_capacity(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Fetch timeout as Duration for use with reqwest/tokio.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Cache ceiling converted from megabytes to bytes.
    pub fn max_db_size_bytes(&self) -> u64 {
        self.max_db_size.saturating_mul(1024 * 1024)
    }

    /// Retry policy shared by both stores.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.store_retry_attempts, Duration::from_millis(self.store_retry_delay_ms))
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The layered figment this configuration is extracted from.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RESIZER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment
            .merge(Env::raw().only(&LEGACY_ENV).map(|key| key.as_str().to_lowercase().into()))
            .merge(Env::prefixed("RESIZER_").ignore(&["CONFIG_FILE"]).map(|key| key.as_str().to_lowercase().into()))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
