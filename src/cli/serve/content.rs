//! Client script injection.

use crate::core::PageId;
use crate::embed::serve::PingVars;

use super::PING_PATH;

/// Inline `<script>` that pings for `page` every `interval` ms, over the
/// WebSocket when `ws_port` is set and over HTTP otherwise.
pub fn client_script(page: &PageId, ws_port: Option<u16>, interval: u64) -> String {
    let js = PingVars {
        page: page.as_str(),
        endpoint: PING_PATH,
        ws_port,
        interval,
    }
    .render();
    format!("<script>\n{js}</script>\n")
}

/// Insert `snippet` before the last `</body>` tag, or append it when the
/// document has none.
pub fn inject_before_body_end(content: &[u8], snippet: &str) -> Vec<u8> {
    // Byte pattern for </body> - most generators use lowercase
    const PATTERN: &[u8] = b"</body>";

    let snippet = snippet.as_bytes();
    let mut result = Vec::with_capacity(content.len() + snippet.len());

    match content
        .windows(PATTERN.len())
        .rposition(|w| w.eq_ignore_ascii_case(PATTERN))
    {
        Some(pos) => {
            result.extend_from_slice(&content[..pos]);
            result.extend_from_slice(snippet);
            result.extend_from_slice(&content[pos..]);
        }
        None => {
            result.extend_from_slice(content);
            result.extend_from_slice(snippet);
        }
    }
    result
}
