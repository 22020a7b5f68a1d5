//! Media proxy target resolution and caching metadata.
//!
//! The media proxy lets the browser load generated images and videos that
//! live on other origins. Relative paths are resolved against the media
//! backend, absolute `http(s)` URLs pass through, and everything else is
//! rejected before any network call is made.

use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// User agent sent to media hosts, some of which reject non-browser clients.
pub const MEDIA_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
/// Cache policy attached to every proxied media response.
pub const MEDIA_CACHE_CONTROL: &str = "public, max-age=86400";
/// Content type used when the media host does not send one.
pub const DEFAULT_MEDIA_CONTENT_TYPE: &str = "application/octet-stream";

/// Schemes the proxy is allowed to fetch.
pub const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Number of hex characters of the SHA-256 digest kept in an ETag.
const ETAG_HEX_LEN: usize = 32;

/// Resolve the `url` query parameter of a media request into a fetchable URL.
///
/// * Relative paths (no scheme) are joined onto `backend_base`.
/// * `http://` and `https://` URLs are returned unchanged.
/// * Any other scheme is a validation error.
pub fn resolve_media_url(raw: &str, backend_base: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Missing url parameter".to_string()));
    }

    match scheme_of(trimmed) {
        Some(scheme) => {
            let lowered = scheme.to_ascii_lowercase();
            if ALLOWED_SCHEMES.contains(&lowered.as_str()) {
                Ok(trimmed.to_string())
            } else {
                Err(CoreError::Validation(format!(
                    "Unsupported URL scheme: '{scheme}'"
                )))
            }
        }
        None if trimmed.starts_with("//") => Err(CoreError::Validation(
            "Protocol-relative URLs are not supported".to_string(),
        )),
        None => Ok(format!(
            "{}/{}",
            backend_base.trim_end_matches('/'),
            trimmed.trim_start_matches('/')
        )),
    }
}

/// Synthetic ETag for a resolved target URL.
///
/// Derived from the URL rather than the content, so it can be compared
/// before the upstream is contacted.
pub fn media_etag(target_url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(target_url.as_bytes()));
    format!("\"{}\"", &digest[..ETAG_HEX_LEN])
}

/// Whether an `If-None-Match` header value matches `etag`.
///
/// Accepts `*`, comma-separated lists and weak validators (`W/"..."`).
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// Extract the URL scheme (RFC 3986: `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`).
fn scheme_of(url: &str) -> Option<&str> {
    let colon = url.find(':')?;
    let candidate = &url[..colon];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const BASE: &str = "http://backend:8000/";

    // -- resolve_media_url ---------------------------------------------------

    #[test]
    fn relative_path_joins_backend() {
        assert_eq!(
            resolve_media_url("/static/images/a.png", BASE).unwrap(),
            "http://backend:8000/static/images/a.png"
        );
        assert_eq!(
            resolve_media_url("static/v.mp4", "http://backend:8000").unwrap(),
            "http://backend:8000/static/v.mp4"
        );
    }

    #[test]
    fn absolute_http_urls_pass_through() {
        let url = "https://cdn.example.com/x.png?sig=abc";
        assert_eq!(resolve_media_url(url, BASE).unwrap(), url);
        assert_eq!(
            resolve_media_url("HTTP://cdn.example.com/y", BASE).unwrap(),
            "HTTP://cdn.example.com/y"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        for url in ["file:///etc/passwd", "ftp://host/x", "javascript:alert(1)", "data:text/plain,hi"] {
            assert_matches!(resolve_media_url(url, BASE), Err(CoreError::Validation(_)), "{url}");
        }
    }

    #[test]
    fn empty_and_protocol_relative_are_rejected() {
        assert_matches!(resolve_media_url("  ", BASE), Err(CoreError::Validation(_)));
        assert_matches!(
            resolve_media_url("//evil.example/x", BASE),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn colon_inside_relative_path_is_not_a_scheme() {
        assert_eq!(
            resolve_media_url("images/12:30/a.png", BASE).unwrap(),
            "http://backend:8000/images/12:30/a.png"
        );
    }

    // -- media_etag ----------------------------------------------------------

    #[test]
    fn etag_is_quoted_and_stable() {
        let a = media_etag("https://cdn.example.com/a.png");
        assert_eq!(a, media_etag("https://cdn.example.com/a.png"));
        assert_eq!(a.len(), ETAG_HEX_LEN + 2);
        assert!(a.starts_with('"') && a.ends_with('"'));
        assert_ne!(a, media_etag("https://cdn.example.com/b.png"));
    }

    #[test]
    fn etag_matching_handles_lists_and_weak_validators() {
        let etag = media_etag("u");
        assert!(etag_matches(&etag, &etag));
        assert!(etag_matches(&format!("W/{etag}"), &etag));
        assert!(etag_matches(&format!("\"other\", {etag}"), &etag));
        assert!(etag_matches("*", &etag));
        assert!(!etag_matches("\"other\"", &etag));
    }
}
