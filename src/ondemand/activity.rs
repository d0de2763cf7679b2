//! Activity tracking: client pings keep built pages warm.
//!
//! Each connected client periodically reports the page it is showing. Pings
//! refresh the entry's `last_active` and push the page into a small recency
//! buffer that protects it from disposal even when pings are delayed.

use std::collections::VecDeque;
use std::time::Instant;

use super::State;
use crate::core::PageId;

// =============================================================================
// Recency Buffer
// =============================================================================

/// Most-recently pinged pages, newest first, deduplicated.
///
/// A page already in the buffer is considered hot and is not moved; only
/// newly pinged pages go to the front.
#[derive(Debug)]
pub struct RecencyBuffer {
    pages: VecDeque<PageId>,
    capacity: usize,
}

impl RecencyBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            pages: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record a ping. Returns true if the page was newly inserted.
    pub fn touch(&mut self, page: &PageId) -> bool {
        if self.contains(page) {
            return false;
        }
        self.pages.push_front(page.clone());
        self.pages.truncate(self.capacity);
        true
    }

    pub fn contains(&self, page: &PageId) -> bool {
        self.pages.contains(page)
    }

    pub fn to_vec(&self) -> Vec<PageId> {
        self.pages.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pages.len()
    }
}

// =============================================================================
// Ping
// =============================================================================

/// Answer to a client ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingResponse {
    /// The client should resynchronize (reload).
    Invalid,
    Success,
}

impl PingResponse {
    /// Wire shape: `{"invalid":true}` or `{"success":true}`.
    pub fn to_json(self) -> String {
        let body = match self {
            Self::Invalid => serde_json::json!({ "invalid": true }),
            Self::Success => serde_json::json!({ "success": true }),
        };
        body.to_string()
    }
}

impl State {
    pub(super) fn ping(&mut self, page: &PageId, now: Instant) -> PingResponse {
        let Some(entry) = self.registry.get_mut(page) else {
            return PingResponse::Invalid;
        };

        let response = if page.is_error_page() {
            PingResponse::Invalid
        } else {
            PingResponse::Success
        };

        if !entry.is_built() {
            return response;
        }

        if self.recent.touch(page) {
            crate::debug!("ping"; "active: {}", page);
        }
        entry.touch(now);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(buffer: &RecencyBuffer) -> Vec<&str> {
        buffer.pages.iter().map(PageId::as_str).collect()
    }

    #[test]
    fn test_buffer_drops_oldest() {
        let mut buffer = RecencyBuffer::new(2);
        buffer.touch(&PageId::new("/a"));
        buffer.touch(&PageId::new("/b"));
        buffer.touch(&PageId::new("/c"));
        assert_eq!(pages(&buffer), ["/c", "/b"]);
    }

    #[test]
    fn test_buffer_does_not_reorder_known_pages() {
        let mut buffer = RecencyBuffer::new(3);
        assert!(buffer.touch(&PageId::new("/a")));
        assert!(buffer.touch(&PageId::new("/b")));
        assert!(!buffer.touch(&PageId::new("/a/index")));
        assert_eq!(pages(&buffer), ["/b", "/a"]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_ping_json_shape() {
        assert_eq!(PingResponse::Invalid.to_json(), r#"{"invalid":true}"#);
        assert_eq!(PingResponse::Success.to_json(), r#"{"success":true}"#);
    }
}
