//! Upstream URL resolution
//!
//! Pure string handling: no percent-decoding, no query parsing, no I/O.

/// Strip one leading `/`, then one leading `v1/`
///
/// Each prefix is removed at most once; `v1/v1/x` becomes `v1/x`.
pub fn normalize(raw_path: &str) -> &str {
    let path = raw_path.strip_prefix('/').unwrap_or(raw_path);
    path.strip_prefix("v1/").unwrap_or(path)
}

/// Build the upstream URL for a request
///
/// `base_url` is expected without a trailing slash. A `path_override` is
/// appended exactly as written; it does not go through `normalize`.
pub fn resolve(raw_path: &str, base_url: &str, path_override: Option<&str>) -> String {
    match path_override {
        Some(path) => format!("{}/{}", base_url, path),
        None => format!("{}/{}", base_url, normalize(raw_path)),
    }
}
