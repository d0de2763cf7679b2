//! Scheduler instances and the host that replaces them.
//!
//! A scheduler stops for good after a recovery reload (or a config change).
//! The host then launches a fresh instance from the reloaded configuration
//! and swaps it in, so requests redirected during the reload land on it.
//!
//! ```text
//! Host ── slot (ArcSwap) ──> Instance { scheduler, engine, watcher }
//!   └── supervisor: wait_stopped ─> launch ─> store
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;

use crate::config::SiteConfig;
use crate::engine::watch::{Change, SourceWatcher};
use crate::engine::{BuildEngine, MarkdownEngine};
use crate::logger::status_error;
use crate::ondemand::{Scheduler, SchedulerOptions};
use crate::page::FsPageResolver;
use crate::{debug, log};

/// Delay before retrying a failed relaunch.
const RELAUNCH_BACKOFF: Duration = Duration::from_secs(2);

// =============================================================================
// Instance
// =============================================================================

/// One engine, its scheduler and the watcher feeding them.
pub struct Instance {
    pub scheduler: Arc<Scheduler>,
    pub engine: Arc<MarkdownEngine>,
    _watcher: Option<SourceWatcher>,
}

impl Instance {
    pub fn launch(config: Arc<SiteConfig>, watch: bool) -> Result<Arc<Self>> {
        let engine = MarkdownEngine::start(Arc::clone(&config))?;
        let resolver = Arc::new(FsPageResolver::from_config(&config));
        let scheduler = Scheduler::start(
            engine.clone(),
            resolver,
            SchedulerOptions::from(&config.on_demand),
        );

        let watcher = if watch {
            match watch_sources(&config, &scheduler, &engine) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    log!("watch"; "disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Self {
            scheduler,
            engine,
            _watcher: watcher,
        }))
    }

    /// Configuration the engine currently builds with.
    pub fn config(&self) -> Arc<SiteConfig> {
        self.engine.config()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.engine.shutdown();
    }
}

/// Page edits start a build pass; a config edit reloads the engine and stops
/// the scheduler so the host relaunches with the new settings.
fn watch_sources(
    config: &SiteConfig,
    scheduler: &Arc<Scheduler>,
    engine: &Arc<MarkdownEngine>,
) -> notify::Result<SourceWatcher> {
    let paths = [config.build.pages.clone(), config.config_path.clone()];
    let config_path = config.config_path.clone();
    let scheduler = Arc::downgrade(scheduler);
    let engine = Arc::clone(engine);

    SourceWatcher::start(&paths, move |changes| {
        on_change(&changes, &config_path, &scheduler, &engine);
    })
}

fn on_change(
    changes: &[Change],
    config_path: &Path,
    scheduler: &Weak<Scheduler>,
    engine: &MarkdownEngine,
) {
    let Some(scheduler) = scheduler.upgrade() else {
        return;
    };

    if changes.iter().any(|change| change.path == config_path) {
        log!("watch"; "config changed, reloading");
        match engine.full_reload() {
            Ok(()) => scheduler.stop(),
            Err(e) => status_error("config reload failed", &format!("{e:#}")),
        }
        return;
    }

    for change in changes {
        debug!("watch"; "{} {}", change.kind.label(), change.path.display());
    }
    log!("watch"; "{} file(s) changed", changes.len());
    scheduler.invalidate();
}

// =============================================================================
// Host
// =============================================================================

pub struct Host {
    slot: ArcSwap<Instance>,
    watch: bool,
    closing: AtomicBool,
}

impl Host {
    pub fn launch(config: Arc<SiteConfig>, watch: bool) -> Result<Arc<Self>> {
        let instance = Instance::launch(config, watch)?;
        Ok(Arc::new(Self {
            slot: ArcSwap::new(instance),
            watch,
            closing: AtomicBool::new(false),
        }))
    }

    /// The instance new requests should use.
    pub fn current(&self) -> Arc<Instance> {
        self.slot.load_full()
    }

    /// Spawn the thread that relaunches stopped instances.
    pub fn supervise(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let host = Arc::clone(self);
        thread::Builder::new()
            .name("ondemand-host".into())
            .spawn(move || host.run())
            .context("failed to spawn host supervisor")
    }

    /// Stop the current scheduler and do not relaunch it.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.current().scheduler.stop();
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn run(&self) {
        loop {
            let current = self.current();
            current.scheduler.wait_stopped();
            if self.is_closing() {
                break;
            }

            match Instance::launch(current.config(), self.watch) {
                Ok(next) => {
                    self.slot.store(next);
                    log!("reload"; "scheduler restarted");
                    // Shutdown may have stopped the old instance meanwhile.
                    if self.is_closing() {
                        self.current().scheduler.stop();
                    }
                }
                Err(e) => {
                    status_error("restart failed", &format!("{e:#}"));
                    thread::sleep(RELAUNCH_BACKOFF);
                }
            }
        }
        debug!("reload"; "supervisor stopped");
    }
}
