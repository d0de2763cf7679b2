//! Disposal of cold entries.
//!
//! A detached thread ticks on a fixed interval. It holds only a weak handle
//! to the scheduler and never keeps the process alive.

use std::sync::Weak;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use super::{Scheduler, State};
use crate::core::PageId;
use crate::log;

impl State {
    /// Built entries outside the recency buffer idle for longer than `max_age`.
    pub(super) fn inactive_pages(&self, now: Instant, max_age: Duration) -> Vec<PageId> {
        self.registry
            .iter()
            .filter(|(page, entry)| entry.is_built() && !self.recent.contains(page))
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_active) > max_age)
            .map(|(page, _)| page.clone())
            .collect()
    }
}

impl Scheduler {
    /// Evict cold entries and invalidate so the engine stops building them.
    ///
    /// Returns the evicted pages.
    pub fn dispose_inactive(&self, now: Instant) -> Vec<PageId> {
        let (disposed, trigger) = {
            let mut state = self.state.lock();
            if state.stopped {
                return Vec::new();
            }
            let disposed = state.inactive_pages(now, self.options.max_inactive_age);
            for page in &disposed {
                state.registry.delete(page);
            }
            let trigger = !disposed.is_empty() && state.invalidator.invalidate();
            (disposed, trigger)
        };

        if !disposed.is_empty() {
            let names: Vec<_> = disposed.iter().map(PageId::as_str).collect();
            log!("dispose"; "{}", names.join(", "));
        }
        if trigger {
            self.engine.invalidate_watch();
        }
        disposed
    }
}

// =============================================================================
// Sweeper
// =============================================================================

/// Handle to the disposal thread; stopping drops the tick loop.
pub(super) struct Sweeper {
    stop_tx: Sender<()>,
}

impl Sweeper {
    pub(super) fn stop(self) {
        let _ = self.stop_tx.send(());
    }
}

pub(super) fn spawn(scheduler: Weak<Scheduler>, interval: Duration) -> Option<Sweeper> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);

    let spawned = thread::Builder::new()
        .name("ondemand-dispose".into())
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.dispose_inactive(Instant::now());
            }
        });

    match spawned {
        Ok(_) => Some(Sweeper { stop_tx }),
        Err(e) => {
            log!("dispose"; "failed to start sweeper: {}", e);
            None
        }
    }
}
