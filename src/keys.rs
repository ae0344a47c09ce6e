//! Cache key construction helpers.
//!
//! Keys are route paths by convention: `<path>`, `<path>?<query>` for
//! filtered listings, `<path>/<id>` for single entities. Nothing in the
//! store enforces these shapes — they exist so handlers and invalidators
//! derive the same key for the same query.

use std::collections::BTreeMap;

/// Key for a request: the path, plus the query string when present.
pub fn request_key(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_owned(),
    }
}

/// Key for a single entity under a collection path.
pub fn entity_key(path: &str, id: &str) -> String {
    format!("{}/{}", path.trim_end_matches('/'), id)
}

/// Key for a filtered listing with a canonical (sorted) query string, so
/// the same filter set always produces the same key regardless of the
/// order the caller assembled it in.
pub fn listing_key(path: &str, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return path.to_owned();
    }
    let query = params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

/// Anchored pattern matching every key in a path's family: the path itself,
/// any query string on it, and any sub-path. Feed the result to
/// [`crate::QueryCache::invalidate_matching`].
pub fn prefix_pattern(path: &str) -> String {
    format!(r"^{}(\?|/|$)", regex::escape(path))
}
