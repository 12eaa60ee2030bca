//! Request orchestration for the resize endpoint.
//!
//! ```text
//! normalize src -> track referer (queued) -> parse params -> width key
//!   -> cache read (unless no-cache) --hit--> respond
//!   -> domain gate --disabled--> 403
//!   -> fetch (unfetchable src counts as failed) --fail--> placeholder
//!   -> svg? --yes--> passthrough, cache original (queued)
//!   -> decode --fail--> placeholder
//!   -> cache original (queued) -> resize + encode --over pixel ceiling--> placeholder
//!   -> cache result when a transform was requested (queued) -> respond
//! ```
//!
//! Nothing after parameter parsing fails the request: store errors turn
//! into misses and upstream errors into a placeholder graphic.

use std::sync::Arc;

use bytes::Bytes;
use resizer_client::fetch::{Fetcher, UrlError, has_svg_extension, normalize_source};
use resizer_client::imaging::{
    Directives, FormatEncoder, PLACEHOLDER_CONTENT_TYPE, ResizeParams, placeholder_svg, render, transform,
};
use resizer_core::referer::extract_domain;
use resizer_core::{AppConfig, CacheDb, Error, NewEntry, RefererDb};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::tasks::TaskQueue;

/// Framework-independent view of an incoming resize request.
#[derive(Debug, Clone, Default)]
pub struct ResizeRequest {
    pub src: Option<String>,
    pub crop: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    /// Raw `Referer` header, empty when absent.
    pub referer: String,
    /// Client asked for a fresh copy via Cache-Control or Pragma.
    pub no_cache: bool,
}

/// Value of the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// A successful (status 200) resize response.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub body: Bytes,
    pub content_type: String,
    pub cache_status: CacheStatus,
    /// Value of the `X-Info` diagnostic header.
    pub info: String,
    /// `Cache-Control: public, max-age` to advertise; placeholders carry none.
    pub max_age: Option<u64>,
}

/// The resize request orchestrator.
pub struct ResizeService {
    cache: CacheDb,
    referers: RefererDb,
    fetcher: Arc<dyn Fetcher>,
    encoder: FormatEncoder,
    tasks: TaskQueue,
    max_dimension: Option<u32>,
    max_output_pixels: u64,
    max_age: u64,
}

impl ResizeService {
    pub fn new(
        cache: CacheDb, referers: RefererDb, fetcher: Arc<dyn Fetcher>, encoder: FormatEncoder, tasks: TaskQueue,
    ) -> Self {
        let defaults = AppConfig::default();
        Self {
            cache,
            referers,
            fetcher,
            encoder,
            tasks,
            max_dimension: defaults.max_dimension,
            max_output_pixels: defaults.max_output_pixels,
            max_age: defaults.max_age,
        }
    }

    /// Apply the dimension clamp, pixel ceiling and response max-age from `config`.
    pub fn with_limits(mut self, config: &AppConfig) -> Self {
        self.max_dimension = config.max_dimension;
        self.max_output_pixels = config.max_output_pixels;
        self.max_age = config.max_age;
        self
    }

    /// Serve one resize request.
    ///
    /// # Errors
    ///
    /// Only for a missing or undecodable `src`, bad resize parameters, or a
    /// disabled referer domain. Everything else yields an image; a `src`
    /// that is not a fetchable http(s) URL ends up as a placeholder.
    pub async fn handle(&self, request: ResizeRequest) -> Result<ImageResponse, ApiError> {
        let src = request.src.as_deref().map(str::trim).filter(|s| !s.is_empty()).ok_or(ApiError::MissingSource)?;
        let url = match normalize_source(src) {
            Ok(url) => Ok(url),
            Err(UrlError::Empty) => return Err(ApiError::MissingSource),
            Err(UrlError::Undecodable(msg)) => return Err(ApiError::InvalidSource(msg)),
            Err(err) => Err(Error::FetchFailed(err.to_string())),
        };

        self.track_referer(request.referer.clone());

        let params = ResizeParams::parse(Directives {
            crop: request.crop.as_deref(),
            width: request.width.as_deref(),
            height: request.height.as_deref(),
        })?;
        let params = match self.max_dimension {
            Some(max) => params.clamp_to(max),
            None => params,
        };
        let width_key = params.width_key();
        let source = match &url {
            Ok(url) => url.as_str().to_string(),
            Err(_) => src.to_string(),
        };

        let miss_status = if request.no_cache {
            debug!(url = %source, "client requested fresh copy, skipping cache read");
            CacheStatus::Bypass
        } else {
            if let Some(hit) = self.lookup(&source, width_key, &params).await {
                return Ok(hit);
            }
            CacheStatus::Miss
        };

        let domain = extract_domain(&request.referer);
        match self.referers.is_disabled(&domain).await {
            Ok(true) => {
                info!(domain = %domain, url = %source, "referer domain disabled");
                return Err(ApiError::DomainForbidden(domain));
            }
            Ok(false) => {}
            Err(err) => warn!(domain = %domain, error = %err, "domain gate check failed, allowing"),
        }

        let url = match url {
            Ok(url) => url,
            Err(err) => {
                warn!(url = %source, error = %err, "source is not a fetchable URL");
                return Ok(placeholder(&params, miss_status, &err));
            }
        };
        let fetched = match self.fetcher.fetch(&url).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(url = %source, error = %err, "upstream fetch failed");
                return Ok(placeholder(&params, miss_status, &err));
            }
        };

        if fetched.is_svg_content() || has_svg_extension(&url) {
            return Ok(self.serve_svg(source, fetched.bytes, miss_status));
        }

        let body = fetched.bytes;
        let decode_input = body.clone();
        let decoded = match tokio::task::spawn_blocking(move || transform::decode(&decode_input)).await {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(err)) => {
                warn!(url = %source, error = %err, "upstream image could not be decoded");
                return Ok(placeholder(&params, miss_status, &err));
            }
            Err(join) => return Ok(placeholder(&params, miss_status, &Error::DecodeFailed(join.to_string()))),
        };

        let input = decoded.format_name();
        let original_type = fetched.content_type.unwrap_or_else(|| format!("image/{input}"));
        self.cache_original(source.clone(), body.to_vec(), original_type, input);

        let encoder = self.encoder.clone();
        let render_params = params.clone();
        let max_pixels = self.max_output_pixels;
        let rendered = tokio::task::spawn_blocking(move || render(decoded, &render_params, &encoder, max_pixels));
        let encoded = match rendered.await {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(err)) => {
                warn!(url = %source, error = %err, "encoding failed");
                return Ok(placeholder(&params, miss_status, &err));
            }
            Err(join) => return Ok(placeholder(&params, miss_status, &Error::EncodeFailed(join.to_string()))),
        };

        let body = Bytes::from(encoded.bytes);
        let content_type = encoded.format.content_type().to_string();

        if params.is_transform() {
            let cache = self.cache.clone();
            let entry = NewEntry {
                url: source.clone(),
                width_key,
                params_key: params.cache_key.clone(),
                original_data: None,
                resized_data: Some(body.to_vec()),
                content_type: content_type.clone(),
                response_format: encoded.format.as_str().to_string(),
            };
            self.tasks.submit("cache.put", async move { cache.put(entry).await });
        }

        debug!(url = %source, params = %params.cache_key, input, output = %encoded.format, "resized image");

        Ok(ImageResponse {
            body,
            content_type,
            cache_status: miss_status,
            info: format!("fresh-fetch; params={}; input={input}; output={}", params.cache_key, encoded.format),
            max_age: Some(self.max_age),
        })
    }

    async fn lookup(&self, source: &str, width_key: i64, params: &ResizeParams) -> Option<ImageResponse> {
        match self.cache.get(source, width_key).await {
            Ok(Some(hit)) if hit.params_key == params.cache_key => {
                debug!(url = %source, params = %params.cache_key, "cache hit");
                Some(ImageResponse {
                    body: Bytes::from(hit.data),
                    content_type: hit.content_type,
                    cache_status: CacheStatus::Hit,
                    info: format!("from-cache; params={}; format={}", params.cache_key, hit.format),
                    max_age: Some(self.max_age),
                })
            }
            Ok(Some(hit)) => {
                warn!(
                    url = %source,
                    width_key,
                    stored = %hit.params_key,
                    requested = %params.cache_key,
                    "width key collision, treating as miss"
                );
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(url = %source, width_key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn serve_svg(&self, source: String, body: Bytes, status: CacheStatus) -> ImageResponse {
        self.cache_original(source, body.to_vec(), PLACEHOLDER_CONTENT_TYPE.to_string(), "svg");
        ImageResponse {
            body,
            content_type: PLACEHOLDER_CONTENT_TYPE.to_string(),
            cache_status: status,
            info: "fresh-fetch; format=svg; no-manipulation".to_string(),
            max_age: Some(self.max_age),
        }
    }

    fn track_referer(&self, referer: String) {
        let referers = self.referers.clone();
        self.tasks.submit("referer.track", async move { referers.track(&referer).await.map(|_| ()) });
    }

    fn cache_original(&self, source: String, data: Vec<u8>, content_type: String, format: &'static str) {
        let cache = self.cache.clone();
        self.tasks.submit("cache.put_original", async move {
            cache.put_original(&source, data, &content_type, format).await
        });
    }
}

fn placeholder(params: &ResizeParams, status: CacheStatus, err: &Error) -> ImageResponse {
    ImageResponse {
        body: Bytes::from(placeholder_svg(params.width, params.height)),
        content_type: PLACEHOLDER_CONTENT_TYPE.to_string(),
        cache_status: status,
        info: failure_info(err),
        max_age: None,
    }
}

/// `X-Info` text for an upstream failure.
fn failure_info(err: &Error) -> String {
    match err {
        Error::UpstreamStatus(status) => format!("error; fetch-failed; status={status}"),
        Error::EmptyBody => "error; empty-data".to_string(),
        Error::FetchTooLarge(msg) => format!("error; read-failed; {msg}"),
        Error::FetchFailed(msg) | Error::FetchTimeout(msg) => format!("error; fetch-failed; {msg}"),
        Error::DecodeFailed(msg) => format!("error; decode-failed; {msg}"),
        Error::EncodeFailed(msg) => format!("error; encode-failed; {msg}"),
        Error::OutputTooLarge(msg) => format!("error; output-too-large; {msg}"),
        other => format!("error; fetch-failed; {other}"),
    }
}
