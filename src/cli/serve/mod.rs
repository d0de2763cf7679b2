//! Development server: pages are built when requested.
//!
//! ```text
//! GET /_ondemand/ping?page=  ─> scheduler.handle_ping
//! GET /<page>                ─> ensure_page, bounded by build_timeout ─> artifact
//!                               unavailable ─> 302 to the same URL
//! ```

mod content;
mod instance;
mod lifecycle;
mod ping;
mod response;


use std::sync::Arc;

use anyhow::{Context, Result};
use tiny_http::{Request, Server};

use crate::config::SiteConfig;
use crate::core::{ERROR_PAGE, PageId, is_shutdown, register_server, unit_name};
use crate::ondemand::OnDemandError;
use crate::{debug, log};

use instance::{Host, Instance};

/// Ping endpoint for clients without a WebSocket.
pub const PING_PATH: &str = "/_ondemand/ping";

/// Request worker count. Page requests block while their page builds.
const REQUEST_THREADS: usize = 8;

/// Bind, launch the first scheduler and serve until Ctrl+C.
pub fn serve(config: Arc<SiteConfig>) -> Result<()> {
    let (server, addr) = lifecycle::bind_with_retry(config.http_addr())?;
    let server = Arc::new(server);

    let host = Host::launch(Arc::clone(&config), true)?;
    let ws_port = config.serve.ws_port.and_then(|port| {
        ping::start_ws_server(config.serve.interface, port, Arc::clone(&host))
            .inspect(|port| debug!("ws"; "ws://{}:{}", config.serve.interface, port))
            .inspect_err(|e| log!("ws"; "disabled, falling back to http ping: {:#}", e))
            .ok()
    });

    let shutdown_host = Arc::clone(&host);
    register_server(
        Arc::clone(&server),
        Box::new(move || shutdown_host.shutdown()),
    );
    let supervisor = host.supervise()?;

    log!("serve"; "http://{}", addr);
    run_request_loop(&server, &host, ws_port)?;

    host.shutdown();
    let _ = supervisor.join();
    host.current().engine.shutdown();
    Ok(())
}

fn run_request_loop(server: &Server, host: &Arc<Host>, ws_port: Option<u16>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_THREADS)
        .thread_name(|i| format!("ondemand-http-{i}"))
        .build()
        .context("failed to create request pool")?;

    for request in server.incoming_requests() {
        let host = Arc::clone(host);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &host, ws_port) {
                log!("serve"; "request error: {e:#}");
            }
        });
    }
    Ok(())
}

/// Handle a single HTTP request
fn handle_request(request: Request, host: &Host, ws_port: Option<u16>) -> Result<()> {
    if is_shutdown() {
        return response::respond_unavailable(request);
    }

    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    let instance = host.current();

    if path == PING_PATH {
        return ping::respond(request, query, &instance.scheduler);
    }
    serve_page(request, &url, &instance, ws_port)
}

fn serve_page(
    request: Request,
    url: &str,
    instance: &Instance,
    ws_port: Option<u16>,
) -> Result<()> {
    let scheduler = &instance.scheduler;
    if !scheduler.is_available() {
        let reason = if scheduler.is_reloading() { "reloading" } else { "restarting" };
        debug!("serve"; "{} unavailable ({}), redirecting", url, reason);
        return response::respond_redirect(request, url);
    }

    let config = instance.config();
    let page = PageId::from_browser(url);
    let interval = config.serve.ping_interval;
    let error_script = || content::client_script(&PageId::new(ERROR_PAGE), ws_port, interval);

    let outcome = match config.serve.build_timeout() {
        Some(timeout) => scheduler
            .request_page(&page)
            .and_then(|wait| wait.wait_timeout(timeout)),
        None => scheduler.ensure_page(&page),
    };

    match outcome {
        Ok(()) => {
            let artifact = instance.engine.artifact_path(&unit_name(&page));
            let script = content::client_script(&page, ws_port, interval);
            response::respond_page(request, &artifact, &script)
        }
        Err(OnDemandError::PageNotFound(_) | OnDemandError::InvalidPage(_)) => {
            response::respond_not_found(request, &page, &error_script())
        }
        Err(OnDemandError::Timeout(_)) => {
            let detail = scheduler
                .last_error(&page)
                .unwrap_or_else(|| "build did not finish in time".to_string());
            response::respond_build_error(request, &page, &detail, &error_script())
        }
        Err(e @ (OnDemandError::HardFailure(_) | OnDemandError::Stopped)) => {
            debug!("serve"; "{}: {}, redirecting", page, e);
            response::respond_redirect(request, url)
        }
        Err(e @ OnDemandError::Registry(_)) => {
            response::respond_build_error(request, &page, &e.to_string(), &error_script())
        }
    }
}
