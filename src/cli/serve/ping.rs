//! Ping transports: `GET /_ondemand/ping?page=<id>` and the WebSocket server.
//!
//! Both answer with `PingResponse::to_json` for the page the client shows.

use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tiny_http::Request;
use tungstenite::protocol::Message;

use super::instance::Host;
use super::lifecycle::bind_ws_with_retry;
use super::response::{mime, send_body};
use crate::core::{PageId, is_shutdown};
use crate::ondemand::Scheduler;
use crate::{debug, log};

// =============================================================================
// HTTP
// =============================================================================

pub fn respond(request: Request, query: &str, scheduler: &Scheduler) -> Result<()> {
    let Some(page) = page_param(query) else {
        return send_body(request, 400, mime::PLAIN, b"missing page parameter".to_vec());
    };
    let body = scheduler.handle_ping(&page).to_json();
    send_body(request, 200, mime::JSON, body.into_bytes())
}

fn page_param(query: &str) -> Option<PageId> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "page")
        .map(|(_, value)| PageId::new(&value))
}

// =============================================================================
// WebSocket
// =============================================================================

/// Bind the WebSocket ping server and accept clients in the background.
///
/// Returns the port actually bound.
pub fn start_ws_server(interface: IpAddr, base_port: u16, host: Arc<Host>) -> Result<u16> {
    let (listener, port) = bind_ws_with_retry(interface, base_port)?;
    thread::Builder::new()
        .name("ondemand-ws".into())
        .spawn(move || accept_loop(&listener, &host))
        .context("failed to spawn websocket acceptor")?;
    Ok(port)
}

fn accept_loop(listener: &TcpListener, host: &Arc<Host>) {
    for stream in listener.incoming() {
        if is_shutdown() {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                debug!("ws"; "accept error: {}", e);
                continue;
            }
        };

        let host = Arc::clone(host);
        let spawned = thread::Builder::new()
            .name("ondemand-ws-client".into())
            .spawn(move || serve_client(stream, &host));
        if let Err(e) = spawned {
            log!("ws"; "failed to spawn client thread: {}", e);
        }
    }
}

/// Each text frame names the page the client shows; each is answered.
fn serve_client(stream: TcpStream, host: &Host) {
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            debug!("ws"; "handshake failed: {}", e);
            return;
        }
    };
    debug!("ws"; "client connected");

    loop {
        match ws.read() {
            Ok(Message::Text(text)) => {
                let page = PageId::new(text.as_str());
                // Always the current instance: a restarted scheduler answers
                // `invalid` for pages it has not seen.
                let reply = host.current().scheduler.handle_ping(&page).to_json();
                if ws.send(Message::Text(reply.into())).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    debug!("ws"; "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_param() {
        assert_eq!(page_param("page=%2Fblog%2Fpost"), Some(PageId::new("/blog/post")));
        assert_eq!(page_param("x=1&page=/docs/"), Some(PageId::new("/docs")));
        assert_eq!(page_param("page="), Some(PageId::root()));
        assert_eq!(page_param("x=1"), None);
        assert_eq!(page_param(""), None);
    }
}
