//! Header rewriting for both directions of the relay

use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, ORIGIN};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Check if a header belongs to a single connection and must not be relayed
fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Headers the HTTP client recomputes for the outbound request
fn is_recomputed(name: &HeaderName) -> bool {
    matches!(name.as_str(), "host" | "content-length")
}

/// Derive the outbound request headers
///
/// Only the first value of each inbound header is kept. The caller's own
/// credentials (`authorization`, `x-api-key`) never reach the provider:
/// `Authorization` is always `Bearer <credential_secret>`.
pub fn rewrite_request_headers(
    inbound: &HeaderMap,
    credential_secret: &str,
) -> Result<HeaderMap, axum::http::header::InvalidHeaderValue> {
    let mut outbound = HeaderMap::with_capacity(inbound.keys_len() + 1);

    for name in inbound.keys() {
        if is_hop_by_hop(name) || is_recomputed(name) || name.as_str() == "x-api-key" {
            continue;
        }
        if let Some(first) = inbound.get(name) {
            outbound.insert(name.clone(), first.clone());
        }
    }

    let mut auth = HeaderValue::from_str(&format!("Bearer {}", credential_secret))?;
    auth.set_sensitive(true);
    outbound.insert(AUTHORIZATION, auth);

    Ok(outbound)
}

/// CORS origin to send back: the request's `Origin`, or `*`
pub fn allow_origin(inbound: &HeaderMap) -> HeaderValue {
    inbound
        .get(ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"))
}

/// Mirror upstream response headers for the caller, adding the CORS origin
///
/// Every value of multi-valued headers is kept. `content-length` is dropped
/// since the relayed body may be streamed.
pub fn response_headers(upstream: &HeaderMap, origin: HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.keys_len() + 1);
    for (name, value) in upstream {
        if is_hop_by_hop(name) || name.as_str() == "content-length" {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers
}
