//! Resize endpoint.
//!
//! Maps the query string and request headers onto a [`ResizeRequest`] and
//! the pipeline's [`ImageResponse`] back onto HTTP.

use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA, REFERER};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::pipeline::{ImageResponse, ResizeRequest};

const X_CACHE: &str = "x-cache";
const X_INFO: &str = "x-info";

/// Query parameters accepted by the resize endpoint.
///
/// Short and long spellings are both accepted; the short one wins when a
/// request carries both.
#[derive(Debug, Default, Deserialize)]
pub struct ResizeQuery {
    pub src: Option<String>,
    pub c: Option<String>,
    pub crop: Option<String>,
    pub w: Option<String>,
    pub width: Option<String>,
    pub h: Option<String>,
    pub height: Option<String>,
}

impl ResizeQuery {
    fn into_request(self, headers: &HeaderMap) -> ResizeRequest {
        ResizeRequest {
            src: self.src,
            crop: self.c.or(self.crop),
            width: self.w.or(self.width),
            height: self.h.or(self.height),
            referer: headers.get(REFERER).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string(),
            no_cache: wants_fresh(headers),
        }
    }
}

pub async fn resize(
    State(state): State<AppState>, Query(query): Query<ResizeQuery>, headers: HeaderMap,
) -> Result<Response, ApiError> {
    let request = query.into_request(&headers);
    let image = state.service.handle(request).await?;
    Ok(image.into_response())
}

/// Whether the client asked to skip cached copies.
pub fn wants_fresh(headers: &HeaderMap) -> bool {
    let cache_control = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| {
            let v = v.to_ascii_lowercase();
            v.contains("no-cache") || v.contains("no-store")
        });

    let pragma = headers
        .get(PRAGMA)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("no-cache"));

    cache_control || pragma
}

impl IntoResponse for ImageResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, header_value(&self.content_type));
        headers.insert(X_CACHE, HeaderValue::from_static(self.cache_status.as_str()));
        headers.insert(X_INFO, header_value(&self.info));
        if let Some(max_age) = self.max_age {
            headers.insert(CACHE_CONTROL, header_value(&format!("public, max-age={max_age}")));
        }
        (StatusCode::OK, headers, self.body).into_response()
    }
}

/// Header value with anything outside printable ASCII replaced by `?`.
fn header_value(raw: &str) -> HeaderValue {
    let cleaned: String = raw.chars().map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' }).collect();
    HeaderValue::from_str(&cleaned).unwrap_or_else(|_| HeaderValue::from_static(""))
}
