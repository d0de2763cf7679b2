//! Process-wide shutdown state for serve mode.
//!
//! Scheduler state is per instance (see `ondemand::Scheduler`); only the
//! Ctrl+C plumbing is global, because the signal handler has no other way to
//! reach the running server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tiny_http::Server;

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// HTTP server reference for graceful shutdown
static SERVER: OnceLock<Arc<Server>> = OnceLock::new();

/// Callback that stops the running scheduler
static ON_SHUTDOWN: OnceLock<Box<dyn Fn() + Send + Sync>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
///
/// - Before `register_server()`: exit immediately, nothing to tear down
/// - After `register_server()`: stop the scheduler and unblock the server
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);

        if let Some(on_shutdown) = ON_SHUTDOWN.get() {
            on_shutdown();
        }

        if let Some(server) = SERVER.get() {
            crate::log!("serve"; "shutting down...");
            server.unblock();
        } else {
            std::process::exit(0);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Register the HTTP server and the scheduler stop callback
///
/// Call this after binding the server, before entering the request loop
pub fn register_server(server: Arc<Server>, on_shutdown: Box<dyn Fn() + Send + Sync>) {
    let _ = SERVER.set(server);
    let _ = ON_SHUTDOWN.set(on_shutdown);
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
