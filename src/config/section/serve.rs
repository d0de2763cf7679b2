//! `[serve]` section configuration.
//!
//! Contains development server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 5277                 # HTTP port number
//! ws_port = 35729             # Ping WebSocket port (omit to ping over HTTP)
//! build_timeout = 30000       # ms a page request waits for its build (0 = no limit)
//! ping_interval = 5000        # ms between client pings
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// WebSocket port for client pings. `None` pings over HTTP.
    pub ws_port: Option<u16>,

    /// Upper bound (ms) on how long a page request waits for its build.
    /// `0` waits until the build finishes.
    pub build_timeout: u64,

    /// Interval (ms) between client pings.
    pub ping_interval: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5277,
            ws_port: Some(35729),
            build_timeout: 30_000,
            ping_interval: 5_000,
        }
    }
}

impl ServeConfig {
    pub fn build_timeout(&self) -> Option<Duration> {
        (self.build_timeout > 0).then(|| Duration::from_millis(self.build_timeout))
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.ping_interval == 0 {
            diag.error(FieldPath::new("serve.ping_interval"), "must be greater than 0");
        }
        if self.ws_port.is_some_and(|ws| ws == self.port) {
            diag.error_with_hint(
                FieldPath::new("serve.ws_port"),
                "conflicts with serve.port",
                "use a different port, or remove ws_port to ping over HTTP",
            );
        }
    }
}
