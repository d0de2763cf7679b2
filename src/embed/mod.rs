//! Embedded static resources.
//!
//! - `serve` - Dev server client script (ping.js)

pub mod serve {
    /// Client that keeps the served page marked active. Placeholders are
    /// filled in by [`PingVars::render`].
    const PING_JS: &str = include_str!("serve/ping.js");

    /// Values substituted into ping.js.
    pub struct PingVars<'a> {
        /// Page the document was served for.
        pub page: &'a str,
        /// Ping endpoint (HTTP fallback).
        pub endpoint: &'a str,
        /// WebSocket port; HTTP polling when `None`.
        pub ws_port: Option<u16>,
        /// Milliseconds between pings.
        pub interval: u64,
    }

    impl PingVars<'_> {
        pub fn render(&self) -> String {
            let ws_port = self
                .ws_port
                .map_or_else(|| "null".to_string(), |port| port.to_string());

            PING_JS
                .replace("__PAGE__", &js_string(self.page))
                .replace("__ENDPOINT__", &js_string(self.endpoint))
                .replace("__WS_PORT__", &ws_port)
                .replace("__INTERVAL__", &self.interval.to_string())
        }
    }

    /// JSON string literals are valid JS string literals. `</` is escaped so
    /// the value cannot close the inline `<script>` element.
    fn js_string(value: &str) -> String {
        serde_json::Value::from(value).to_string().replace("</", "<\\/")
    }
}
