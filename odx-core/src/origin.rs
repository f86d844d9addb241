//! Restricted-origin policy and hostname resolution.

use url::Url;

/// URL prefixes on which no extension behavior may run. Exact, case-sensitive
/// prefix match; the same set gates both injection and in-page
/// initialization.
pub const RESTRICTED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "moz-extension://",
    "file://",
    "about:",
    "edge://",
    "brave://",
    "data:",
];

/// Whether `url` is a restricted origin.
#[must_use]
pub fn is_restricted(url: &str) -> bool {
    RESTRICTED_PREFIXES.iter().any(|p| url.starts_with(p))
}

/// The hostname of `url`, if it parses and has one. Restricted origins never
/// resolve to a hostname.
#[must_use]
pub fn hostname(url: &str) -> Option<String> {
    if is_restricted(url) {
        return None;
    }
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
}
