//! Utility functions for request processing

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Extract the token a caller presented
///
/// Checks `x-api-key` first, then `Authorization: Bearer <token>`.
pub(crate) fn extract_caller_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Short, stable fingerprint of a secret for log lines (never log the actual key!)
pub(crate) fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)[..16].to_string()
}
