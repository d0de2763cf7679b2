//! Page identifier type for type-safe route handling.
//!
//! - Internal representation: always canonical and decoded
//! - Browser boundary: decode on input (`from_browser`)

use std::borrow::{Borrow, Cow};
use std::fmt;
use std::sync::Arc;

/// Route of the designated fallback page. Pings against it always report
/// `invalid` so the client keeps refreshing until a real page exists.
pub const ERROR_PAGE: &str = "/_error";

/// Canonical page identifier.
///
/// Invariants:
/// - Always starts with `/`
/// - Never ends with `/`, except the root `/`
/// - Never ends with `/index` (`/index` itself is `/`)
/// - Contains no empty segments, query string or fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(Arc<str>);

impl PageId {
    /// Create from a raw route string, normalizing it.
    pub fn new(raw: &str) -> Self {
        Self(Arc::from(normalize(raw)))
    }

    /// Create from browser URL (decode percent-encoding, strip query string).
    pub fn from_browser(encoded: &str) -> Self {
        use percent_encoding::percent_decode_str;
        let path = encoded.split(['?', '#']).next().unwrap_or(encoded);
        let decoded = percent_decode_str(path)
            .decode_utf8()
            .map(Cow::into_owned)
            .unwrap_or_else(|_| path.to_string());
        Self::new(&decoded)
    }

    /// The root page (`/`).
    pub fn root() -> Self {
        Self(Arc::from("/"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_ref() == "/"
    }

    /// Check if this is the designated fallback page.
    #[inline]
    pub fn is_error_page(&self) -> bool {
        self.0.as_ref() == ERROR_PAGE
    }

    /// Path segments without the leading slash (empty for root).
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Check for `.`/`..` segments, which would escape the pages root.
    pub fn has_relative_segments(&self) -> bool {
        self.segments().any(|s| s == "." || s == "..")
    }
}

/// Normalize a route string.
///
/// `/index` and `/` become `/`, a trailing `/index` is stripped, duplicate and
/// trailing slashes are collapsed. Idempotent.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    while segments.last() == Some(&"index") {
        segments.pop();
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    normalized
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::root()
    }
}

impl AsRef<str> for PageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PageId {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

// =============================================================================
// Tests
// =============================================================================
