//! HTTP application wiring.
//!
//! Builds the axum router, its tracing middleware, and the shared state
//! injected into handlers. Kept apart from `main` so tests can drive the
//! router directly.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use resizer_core::{AppConfig, CacheDb, RefererDb};
use tower_http::trace::TraceLayer;

use crate::pipeline::ResizeService;
use crate::routes;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ResizeService>,
    pub cache: CacheDb,
    pub referers: RefererDb,
    pub config: Arc<AppConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
        tracing::info_span!(
            "http.request",
            method = %request.method(),
            path = %request.uri().path(),
            version = ?request.version()
        )
    });

    Router::new()
        .route("/resize", get(routes::resize::resize))
        .route("/r", get(routes::resize::resize))
        .route("/r/", get(routes::resize::resize))
        .route("/r/*rest", get(routes::resize::resize))
        .route("/c", get(routes::config::show))
        .route("/config", get(routes::config::show))
        .route("/config/toggle-domain", post(routes::config::toggle_domain))
        .layer(trace_layer)
        .with_state(state)
}
