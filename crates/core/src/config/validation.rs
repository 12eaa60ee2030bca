//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first field that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must be greater than 0"));
        }

        if self.max_db_size == 0 {
            return Err(invalid("max_db_size", "must be greater than 0"));
        }

        if !(10..=100).contains(&self.quality) {
            return Err(invalid("quality", "must be between 10 and 100"));
        }

        if self.fetch_timeout_ms < 100 {
            return Err(invalid("fetch_timeout_ms", "must be at least 100ms"));
        }
        if self.fetch_timeout_ms > 300_000 {
            return Err(invalid("fetch_timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }

        if self.max_dimension == Some(0) {
            return Err(invalid("max_dimension", "must be at least 1 when set"));
        }

        if self.max_output_pixels == 0 {
            return Err(invalid("max_output_pixels", "must be greater than 0"));
        }

        if self.eviction_interval_secs == 0 {
            return Err(invalid("eviction_interval_secs", "must be at least 1"));
        }

        if self.store_retry_attempts == 0 {
            return Err(invalid("store_retry_attempts", "must be at least 1"));
        }

        if !(1..=10).contains(&self.encoder_speed) {
            return Err(invalid("encoder_speed", "must be between 1 and 10"));
        }

        if self.task_queue_capacity == 0 {
            return Err(invalid("task_queue_capacity", "must be at least 1"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}
