//! Small shared helpers: static regex compilation, shared URL patterns, and
//! URL basename extraction.

use std::sync::LazyLock;

use regex::Regex;

/// Numeric media id embedded in a story URL
/// (`instagram.com/stories/{user}/{digits}`). Shared by the locator and the
/// media-id resolver.
pub static STORY_MEDIA_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"instagram\.com/stories/[^/]+/(\d+)"));

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Basename of the URL path, query stripped, extension stripped.
///
/// Falls back to the URL itself when the path has no final segment, so a
/// caller always gets a non-empty identifier.
#[must_use]
pub fn media_name(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    match without_query.rsplit('/').next() {
        Some(name) if !name.is_empty() => match name.rfind('.') {
            Some(dot) => name[..dot].to_string(),
            None => name.to_string(),
        },
        _ => url.to_string(),
    }
}
