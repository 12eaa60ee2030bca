//! Stats and domain gate endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use resizer_core::referer::is_sentinel;
use resizer_core::{CacheStats, DomainStat, RefererStat};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::ApiError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Days of per-day referer counts included in the stats, today inclusive.
const RECENT_DAYS: i64 = 7;

/// Body of `GET /config`.
#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub port: u16,
    pub max_db_size_mb: u64,
    pub quality: u8,
    pub max_age: u64,
    pub db_size_bytes: u64,
    pub db_size_mb: f64,
    pub image_count: u64,
    pub referer_stats: Vec<DomainStat>,
    pub recent_referer_stats: Vec<RefererStat>,
}

pub async fn show(State(state): State<AppState>) -> Result<Json<ConfigView>, ApiError> {
    let CacheStats { size_bytes, image_count } = state.cache.stats().await?;
    let referer_stats = state.referers.aggregated_stats().await?;
    let today = Utc::now().date_naive();
    let recent_referer_stats = state.referers.stats_between(today - TimeDelta::days(RECENT_DAYS - 1), today).await?;

    Ok(Json(ConfigView {
        port: state.config.port,
        max_db_size_mb: state.config.max_db_size,
        quality: state.config.quality,
        max_age: state.config.max_age,
        db_size_bytes: size_bytes,
        db_size_mb: size_bytes as f64 / BYTES_PER_MB,
        image_count,
        referer_stats,
        recent_referer_stats,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToggleResponse {
    fn failed(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Self>) {
        (status, Json(Self { success: false, error: Some(error.into()) }))
    }
}

/// `POST /config/toggle-domain`: flip the domain gate for one domain.
///
/// Sentinel domains are rejected here; the tracker itself does not check.
pub async fn toggle_domain(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<ToggleResponse>) {
    let request: ToggleRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return ToggleResponse::failed(StatusCode::BAD_REQUEST, "Invalid JSON"),
    };

    let domain = request.domain.trim();
    if domain.is_empty() {
        return ToggleResponse::failed(StatusCode::BAD_REQUEST, "Domain is required");
    }
    if is_sentinel(domain) {
        return ToggleResponse::failed(StatusCode::BAD_REQUEST, "Cannot toggle status for special domains");
    }

    match state.referers.toggle_disabled(domain).await {
        Ok(disabled) => {
            info!(domain, disabled, "domain gate toggled");
            (StatusCode::OK, Json(ToggleResponse { success: true, error: None }))
        }
        Err(err) => {
            warn!(domain, error = %err, "domain toggle failed");
            ToggleResponse::failed(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to toggle domain status: {err}"),
            )
        }
    }
}
