//! Build lifecycle: drives entries through their states from engine hooks,
//! and recovers the engine when its state becomes inconsistent.
//!
//! A pass is handled in a fixed order:
//!
//! 1. `build_started` - mark building
//! 2. `before_build`  - drop vanished pages, submit the rest, `Building`
//! 3. `after_build`   - promote to `Built`, wake waiters, `done_building`
//! 4. recovery        - only if the pass reported hard failures

use std::thread;
use std::time::Instant;

use super::{OnDemandError, Scheduler, broadcast};
use crate::core::{PageId, page_from_unit};
use crate::engine::{BuildError, BuildHooks, BuildPass, BuildReport};
use crate::{debug, log};

// =============================================================================
// Hard Failure Classification
// =============================================================================

/// A missing module is a hard failure when it is the very unit the error
/// belongs to, or a top-level module with no dependency chain behind it.
/// Anything deeper is an ordinary missing dependency the next pass may fix,
/// whatever its name looks like.
pub(super) fn is_hard_failure(error: &BuildError) -> bool {
    if !error.kind.is_missing_module() {
        return false;
    }
    error.units.contains(&error.module.name) || error.module.dependencies == 0
}

/// Pages whose units hard-failed in this pass, deduplicated.
pub(super) fn hard_failed_pages(report: &BuildReport) -> Vec<PageId> {
    let mut pages = Vec::new();
    for error in report.errors.iter().filter(|e| is_hard_failure(e)) {
        for unit in &error.units {
            if let Some(page) = page_from_unit(unit)
                && !pages.contains(&page)
            {
                pages.push(page);
            }
        }
    }
    pages
}

// =============================================================================
// Build Hooks
// =============================================================================

impl BuildHooks for Scheduler {
    fn build_started(&self) {
        self.state.lock().invalidator.start_building();
    }

    fn before_build(&self, pass: &mut BuildPass) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }

        let vanished: Vec<PageId> = state
            .registry
            .iter()
            .filter(|(_, entry)| !entry.source_path.exists())
            .map(|(page, _)| page.clone())
            .collect();

        for page in vanished {
            if let Some(entry) = state.registry.delete(&page) {
                log!("build"; "{} removed ({})", page, entry.source_path.display());
            }
            let waiters = state.take_waiters(&page);
            broadcast(waiters, &Err(OnDemandError::PageNotFound(page)));
        }

        for (_, entry) in state.registry.iter_mut() {
            pass.submit_unit(&entry.name, &entry.source_path);
            entry.mark_building();
        }
        debug!("build"; "submitted {} unit(s)", pass.units().len());
    }

    fn after_build(&self, report: &BuildReport) {
        let hard_failed = hard_failed_pages(report);
        let now = Instant::now();

        let (trigger, recover) = {
            let mut state = self.state.lock();

            for error in report.errors.iter().filter(|e| !is_hard_failure(e)) {
                for page in error.units.iter().filter_map(|u| page_from_unit(u)) {
                    if let Some(entry) = state.registry.get_mut(&page) {
                        entry.last_error = Some(error.to_string());
                    }
                }
            }

            for page in report.completed.iter().filter_map(|u| page_from_unit(u)) {
                let promoted = state
                    .registry
                    .get_mut(&page)
                    .is_some_and(|entry| entry.mark_built(now));
                if promoted {
                    let waiters = state.take_waiters(&page);
                    broadcast(waiters, &Ok(()));
                }
            }

            for page in &hard_failed {
                let waiters = state.take_waiters(page);
                broadcast(waiters, &Err(OnDemandError::HardFailure(page.clone())));
            }

            let trigger = !state.stopped && state.invalidator.done_building();
            let recover = !hard_failed.is_empty() && !state.reloading && !state.stopped;
            if recover {
                state.reloading = true;
            }
            (trigger, recover)
        };

        if trigger {
            self.engine.invalidate_watch();
        }
        if recover {
            self.begin_recovery(&hard_failed);
        }
    }
}

// =============================================================================
// Recovery
// =============================================================================

impl Scheduler {
    fn begin_recovery(&self, pages: &[PageId]) {
        let names: Vec<_> = pages.iter().map(PageId::as_str).collect();
        log!("reload"; "build state inconsistent ({}), reloading engine", names.join(", "));

        let Some(this) = self.this.upgrade() else {
            return;
        };
        let spawned = thread::Builder::new()
            .name("ondemand-reload".into())
            .spawn(move || this.run_recovery());

        if let Err(e) = spawned {
            self.fail_fatally(&anyhow::anyhow!("failed to spawn reload thread: {e}"));
        }
    }

    fn run_recovery(&self) {
        match self.engine.full_reload() {
            Ok(()) => {
                log!("reload"; "engine reloaded, restarting");
                self.stop();
            }
            Err(e) => self.fail_fatally(&e),
        }
    }

    fn fail_fatally(&self, error: &anyhow::Error) {
        log!("error"; "engine reload failed, cannot continue: {:#}", error);
        (self.fatal)(error);
    }
}
