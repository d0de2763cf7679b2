//! HTTP response handlers.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use percent_encoding::{CONTROLS, utf8_percent_encode};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use super::content::inject_before_body_end;
use crate::core::PageId;

pub mod mime {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const JSON: &str = "application/json";
}

/// Pause before redirecting an unavailable request, so a client does not spin
/// through redirects while the scheduler restarts.
const REDIRECT_DELAY: Duration = Duration::from_millis(250);

/// Respond with a compiled page, injecting the client script.
pub fn respond_page(request: Request, artifact: &Path, script: &str) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 200, mime::HTML);
    }

    let body =
        fs::read(artifact).with_context(|| format!("failed to read {}", artifact.display()))?;
    let body = inject_before_body_end(&body, script);
    send_body(request, 200, mime::HTML, body)
}

/// Respond with 404. The page pings as the error page so it reloads once the
/// URL serves again.
pub fn respond_not_found(request: Request, page: &PageId, script: &str) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 404, mime::HTML);
    }

    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>404</title></head>\n<body>\n<h1>404 Not Found</h1>\n<p>No page for <code>{}</code>.</p>\n</body>\n</html>\n",
        escape_html(page.as_str())
    );
    let body = inject_before_body_end(body.as_bytes(), script);
    send_body(request, 404, mime::HTML, body)
}

/// Respond with a build failure (500), with the client script for
/// auto-refresh once the page builds.
pub fn respond_build_error(
    request: Request,
    page: &PageId,
    detail: &str,
    script: &str,
) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 500, mime::HTML);
    }

    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Build Error</title></head>\n<body>\n<h1>Build Error</h1>\n<p><code>{}</code> did not build.</p>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(page.as_str()),
        escape_html(detail)
    );
    let body = inject_before_body_end(body.as_bytes(), script);
    send_body(request, 500, mime::HTML, body)
}

/// Redirect to the same URL, to be retried against a restarted scheduler.
pub fn respond_redirect(request: Request, location: &str) -> Result<()> {
    thread::sleep(REDIRECT_DELAY);
    let response = Response::empty(StatusCode(302))
        .with_header(make_header("Location", &location_value(location))?)
        .with_header(make_header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, mime::PLAIN, b"503 Service Unavailable".to_vec())
}

pub fn send_body(
    request: Request,
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response = Response::empty(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?)
        .with_header(make_header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

/// Header values must be ASCII without line breaks.
fn location_value(location: &str) -> String {
    utf8_percent_encode(location, CONTROLS).to_string()
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn make_header(key: &'static str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow!("invalid {key} header: {value:?}"))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
