//! On-Demand Page Scheduler
//!
//! Pages are compiled only when first requested and kept warm only while
//! clients are viewing them.
//!
//! ```text
//! request ─> ensure_page ─> registry (Added) ─> invalidate ─> engine pass
//!                 ▲                                             │
//!                 │            before_build: submit, Building   │
//!                 └─ wake ──── after_build:  Built, done ───────┘
//!
//! ping ─> activity (recency buffer, last_active)
//! tick ─> dispose (evict cold Built entries) ─> invalidate
//! hard failure ─> full engine reload ─> stop (host restarts us)
//! ```
//!
//! # Modules
//!
//! - `entry` - Entry registry and status state machine
//! - `invalidator` - Single-flight build trigger
//! - `activity` - Ping handling and recency buffer
//! - `dispose` - Periodic eviction of cold entries
//! - `lifecycle` - Build hooks and failure recovery
//!
//! All mutable state lives behind one mutex. Engine calls are always made
//! after the lock is released.

mod activity;
mod dispose;
mod entry;
mod error;
mod invalidator;
mod lifecycle;

#[cfg(test)]
mod tests;

pub use activity::{PingResponse, RecencyBuffer};
pub use entry::{EntryRegistry, EntryStatus};
pub use error::OnDemandError;
pub use invalidator::Invalidator;

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::config::OnDemandConfig;
use crate::core::PageId;
use crate::debug;
use crate::engine::{BuildEngine, BuildHooks};
use crate::page::PageResolver;

// =============================================================================
// Options
// =============================================================================

/// Retention policy consumed by the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Idle time after which a built page outside the recency buffer is evicted.
    pub max_inactive_age: Duration,
    /// Capacity of the recency buffer.
    pub pages_buffer_length: usize,
    /// Period of the disposal sweep.
    pub dispose_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&OnDemandConfig::default())
    }
}

impl From<&OnDemandConfig> for SchedulerOptions {
    fn from(config: &OnDemandConfig) -> Self {
        Self {
            max_inactive_age: Duration::from_millis(config.max_inactive_age),
            pages_buffer_length: config.pages_buffer_length,
            dispose_interval: Duration::from_millis(config.dispose_interval),
        }
    }
}

/// Called when a recovery reload fails. The engine is unusable afterwards.
pub type FatalHandler = Box<dyn Fn(&anyhow::Error) + Send + Sync>;

fn exit_process(_: &anyhow::Error) {
    std::process::exit(1);
}

// =============================================================================
// State
// =============================================================================

type Waiter = Sender<Result<(), OnDemandError>>;

/// Everything guarded by the scheduler mutex.
struct State {
    registry: EntryRegistry,
    invalidator: Invalidator,
    recent: RecencyBuffer,
    /// One-shot completion senders per page, drained on every broadcast.
    waiters: FxHashMap<PageId, Vec<Waiter>>,
    reloading: bool,
    stopped: bool,
}

impl State {
    fn new(options: &SchedulerOptions) -> Self {
        Self {
            registry: EntryRegistry::new(),
            invalidator: Invalidator::new(),
            recent: RecencyBuffer::new(options.pages_buffer_length),
            waiters: FxHashMap::default(),
            reloading: false,
            stopped: false,
        }
    }

    fn add_waiter(&mut self, page: PageId, tx: Waiter) {
        self.waiters.entry(page).or_default().push(tx);
    }

    fn take_waiters(&mut self, page: &PageId) -> Vec<Waiter> {
        self.waiters.remove(page).unwrap_or_default()
    }
}

fn broadcast(waiters: Vec<Waiter>, result: &Result<(), OnDemandError>) {
    for tx in waiters {
        let _ = tx.send(result.clone());
    }
}

// =============================================================================
// Page Wait
// =============================================================================

/// Outcome of `request_page`: either ready, or a pending build to wait on.
#[derive(Debug)]
pub enum PageWait {
    Ready,
    Pending {
        page: PageId,
        rx: Receiver<Result<(), OnDemandError>>,
    },
}

impl PageWait {
    /// Block until the page is built or its build fails. No timeout.
    pub fn wait(self) -> Result<(), OnDemandError> {
        match self {
            Self::Ready => Ok(()),
            Self::Pending { rx, .. } => rx.recv().unwrap_or(Err(OnDemandError::Stopped)),
        }
    }

    /// Bounded variant for callers that cannot wait forever.
    pub fn wait_timeout(self, timeout: Duration) -> Result<(), OnDemandError> {
        match self {
            Self::Ready => Ok(()),
            Self::Pending { page, rx } => match rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => Err(OnDemandError::Timeout(page)),
                Err(RecvTimeoutError::Disconnected) => Err(OnDemandError::Stopped),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// One scheduler per dev-server instance.
pub struct Scheduler {
    this: Weak<Scheduler>,
    state: Mutex<State>,
    /// Signalled when a reload finishes or the scheduler stops.
    changed: Condvar,
    engine: Arc<dyn BuildEngine>,
    resolver: Arc<dyn PageResolver>,
    options: SchedulerOptions,
    sweeper: Mutex<Option<dispose::Sweeper>>,
    fatal: FatalHandler,
}

impl Scheduler {
    /// Start a scheduler: attach build hooks and begin disposal sweeps.
    pub fn start(
        engine: Arc<dyn BuildEngine>,
        resolver: Arc<dyn PageResolver>,
        options: SchedulerOptions,
    ) -> Arc<Self> {
        Self::start_with(engine, resolver, options, Box::new(exit_process))
    }

    /// Like `start`, with a custom handler for failed recovery reloads.
    pub fn start_with(
        engine: Arc<dyn BuildEngine>,
        resolver: Arc<dyn PageResolver>,
        options: SchedulerOptions,
        fatal: FatalHandler,
    ) -> Arc<Self> {
        let scheduler = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: Mutex::new(State::new(&options)),
            changed: Condvar::new(),
            engine,
            resolver,
            options,
            sweeper: Mutex::new(None),
            fatal,
        });

        let hooks: Arc<dyn BuildHooks> = scheduler.clone();
        scheduler.engine.attach(Arc::downgrade(&hooks));
        *scheduler.sweeper.lock() =
            dispose::spawn(Arc::downgrade(&scheduler), options.dispose_interval);

        debug!("ondemand"; "started (buffer {}, max age {:?})",
            options.pages_buffer_length, options.max_inactive_age);
        scheduler
    }

    /// Stop the scheduler: no further builds, pending waiters fail with
    /// `Stopped`, the sweeper exits. Idempotent.
    pub fn stop(&self) {
        let waiters = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.reloading = false;
            state.invalidator.reset();
            std::mem::take(&mut state.waiters)
        };

        let stopped = Err(OnDemandError::Stopped);
        for (_, page_waiters) in waiters {
            broadcast(page_waiters, &stopped);
        }
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        self.changed.notify_all();
        debug!("ondemand"; "stopped");
    }

    /// Make sure `page` is built, blocking until it is.
    pub fn ensure_page(&self, page: &PageId) -> Result<(), OnDemandError> {
        self.request_page(page)?.wait()
    }

    /// Register interest in `page` without blocking on its build.
    ///
    /// Concurrent requests for a page that is not built yet share one entry,
    /// so the page is submitted once per pass however many callers wait.
    pub fn request_page(&self, page: &PageId) -> Result<PageWait, OnDemandError> {
        self.wait_until_reloaded();

        let resolved = self.resolver.resolve(page)?;
        let (tx, rx) = channel::bounded(1);

        let trigger = {
            let mut state = self.state.lock();
            if state.stopped {
                return Err(OnDemandError::Stopped);
            }

            match state.registry.get(page).map(|entry| entry.status) {
                Some(EntryStatus::Built) => return Ok(PageWait::Ready),
                Some(EntryStatus::Added | EntryStatus::Building) => {
                    state.add_waiter(page.clone(), tx);
                    false
                }
                None => {
                    state.registry.create(
                        page.clone(),
                        resolved.unit_name,
                        resolved.source_path,
                        Instant::now(),
                    )?;
                    state.add_waiter(page.clone(), tx);
                    debug!("ondemand"; "added {}", page);
                    state.invalidator.invalidate()
                }
            }
        };

        if trigger {
            self.engine.invalidate_watch();
        }
        Ok(PageWait::Pending {
            page: page.clone(),
            rx,
        })
    }

    /// Handle a client ping for the page it is showing.
    pub fn handle_ping(&self, page: &PageId) -> PingResponse {
        self.state.lock().ping(page, Instant::now())
    }

    /// Request a build pass (single-flight).
    pub fn invalidate(&self) {
        let trigger = {
            let mut state = self.state.lock();
            !state.stopped && state.invalidator.invalidate()
        };
        if trigger {
            self.engine.invalidate_watch();
        }
    }

    /// Block while a recovery reload is in progress.
    pub fn wait_until_reloaded(&self) {
        let mut state = self.state.lock();
        while state.reloading && !state.stopped {
            self.changed.wait(&mut state);
        }
    }

    /// Block until the scheduler has stopped.
    pub fn wait_stopped(&self) {
        let mut state = self.state.lock();
        while !state.stopped {
            self.changed.wait(&mut state);
        }
    }

    /// Pages may be served (no reload in progress, not stopped).
    pub fn is_available(&self) -> bool {
        let state = self.state.lock();
        !state.reloading && !state.stopped
    }

    pub fn is_reloading(&self) -> bool {
        self.state.lock().reloading
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    #[cfg(test)]
    pub fn entry_status(&self, page: &PageId) -> Option<EntryStatus> {
        self.state.lock().registry.get(page).map(|e| e.status)
    }

    /// Latest non-fatal build error for a page, if any.
    pub fn last_error(&self, page: &PageId) -> Option<String> {
        self.state
            .lock()
            .registry
            .get(page)
            .and_then(|e| e.last_error.clone())
    }

    #[cfg(test)]
    pub fn recent_pages(&self) -> Vec<PageId> {
        self.state.lock().recent.to_vec()
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    #[cfg(test)]
    fn waiter_count(&self, page: &PageId) -> usize {
        self.state.lock().waiters.get(page).map_or(0, Vec::len)
    }

    #[cfg(test)]
    fn set_last_active(&self, page: &PageId, at: Instant) {
        if let Some(entry) = self.state.lock().registry.get_mut(page) {
            entry.last_active = at;
        }
    }
}
