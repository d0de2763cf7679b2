//! Server lifecycle management.

use std::net::{IpAddr, SocketAddr, TcpListener};

use anyhow::{Result, anyhow};
use tiny_http::Server;

use crate::log;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Bind the HTTP server, with automatic port retry.
///
/// Returns the address actually bound, which differs from the requested one
/// after a retry or when port 0 is requested.
pub fn bind_with_retry(base: SocketAddr) -> Result<(Server, SocketAddr)> {
    retry_ports("serve", base.port(), |port| {
        let addr = SocketAddr::new(base.ip(), port);
        let server = Server::http(addr).map_err(|e| anyhow!("{e}"))?;
        let bound = server.server_addr().to_ip().unwrap_or(addr);
        Ok((server, bound))
    })
}

/// Bind the WebSocket listener, with automatic port retry.
pub fn bind_ws_with_retry(interface: IpAddr, base_port: u16) -> Result<(TcpListener, u16)> {
    retry_ports("ws", base_port, |port| {
        let listener = TcpListener::bind(SocketAddr::new(interface, port))?;
        let actual = listener.local_addr()?.port();
        Ok((listener, actual))
    })
}

fn retry_ports<T>(
    scope: &'static str,
    base_port: u16,
    mut bind: impl FnMut(u16) -> Result<T>,
) -> Result<T> {
    let mut last_error = None;

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match bind(port) {
            Ok(bound) => {
                if offset > 0 {
                    log!(scope; "port {} in use, using {} instead", base_port, port);
                }
                return Ok(bound);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
