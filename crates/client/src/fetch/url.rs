//! Source URL normalization.
//!
//! The `src` query value arrives percent-encoded, sometimes twice, and
//! proxies in front of the service tend to collapse `//` after the scheme.
//! Normalization undoes both before the URL is parsed.

use percent_encoding::percent_decode_str;

/// Error type for source URL normalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("undecodable URL: {0}")]
    Undecodable(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for resizer_core::Error {
    fn from(err: UrlError) -> Self {
        resizer_core::Error::InvalidUrl(err.to_string())
    }
}

/// Normalize a raw `src` value into a fetchable URL.
///
/// Steps:
/// 1. Trim whitespace
/// 2. Percent-decode once more (the query layer already decoded once)
/// 3. Restore a missing slash after `http:` / `https:`
/// 4. Parse and require an `http` or `https` scheme
pub fn normalize_source(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let decoded = percent_decode_str(trimmed).decode_utf8().map_err(|e| UrlError::Undecodable(e.to_string()))?;
    let fixed = fix_scheme_slash(&decoded);

    let parsed = url::Url::parse(&fixed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::InvalidUrl(format!("missing host: {fixed}")));
    }

    Ok(parsed)
}

fn fix_scheme_slash(url: &str) -> String {
    for scheme in ["https:", "http:"] {
        if let Some(rest) = url.strip_prefix(scheme)
            && rest.starts_with('/')
            && !rest.starts_with("//")
        {
            return format!("{scheme}/{rest}");
        }
    }
    url.to_string()
}

/// Whether the URL path names an SVG file.
pub fn has_svg_extension(url: &url::Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".svg")
}
