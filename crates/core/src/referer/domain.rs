//! Referer header to base domain.

use url::Url;

/// Domain recorded when a request carries no referer.
pub const DIRECT: &str = "direct";

/// Domain recorded when a referer is present but yields no usable host.
pub const HIDDEN: &str = "hidden";

/// Alternate spelling of [`HIDDEN`] accepted at the toggle boundary.
pub const UNKNOWN: &str = "unknown";

/// Whether `domain` is one of the placeholder domains that can never be toggled.
pub fn is_sentinel(domain: &str) -> bool {
    matches!(domain, DIRECT | HIDDEN | UNKNOWN)
}

/// Reduce a raw `Referer` header to the domain it is tracked under.
///
/// A parsed host loses its `www.` prefix; the port never appears in it.
/// Input that does not parse as an absolute URL falls back to the third
/// `/`-separated token (the host slot of `scheme://host/...`), kept as
/// written apart from the `www.` prefix.
pub fn extract_domain(referer: &str) -> String {
    let referer = referer.trim();
    if referer.is_empty() {
        return DIRECT.to_string();
    }

    match Url::parse(referer) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => strip_www(host).to_string(),
            _ => HIDDEN.to_string(),
        },
        Err(_) => {
            let token = referer.split('/').nth(2).map(|part| part.split(':').next().unwrap_or(part));
            match token.map(strip_www) {
                Some(host) if !host.is_empty() => host.to_string(),
                _ => HIDDEN.to_string(),
            }
        }
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
