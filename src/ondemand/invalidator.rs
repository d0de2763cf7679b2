//! Single-flight build trigger.
//!
//! At most one pass is in flight; any number of invalidations that arrive
//! during a pass collapse into exactly one follow-up pass. A pass is never
//! aborted, because a changed output fingerprint mid-build forces clients
//! into a hard reload.
//!
//! The invalidator only decides; the scheduler performs the engine call
//! (after releasing its lock) whenever a method returns `true`.

#[derive(Debug, Default)]
pub struct Invalidator {
    building: bool,
    rebuild_again: bool,
}

impl Invalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pass. Returns true if the engine must be triggered now,
    /// false if the request was queued behind the running pass.
    #[must_use]
    pub fn invalidate(&mut self) -> bool {
        if self.building {
            self.rebuild_again = true;
            return false;
        }
        self.building = true;
        true
    }

    /// The engine began a pass.
    pub fn start_building(&mut self) {
        self.building = true;
    }

    /// The engine finished a pass. Returns true if a queued request must
    /// trigger the engine again.
    #[must_use]
    pub fn done_building(&mut self) -> bool {
        self.building = false;
        if self.rebuild_again {
            self.rebuild_again = false;
            return self.invalidate();
        }
        false
    }

    #[cfg(test)]
    pub fn is_building(&self) -> bool {
        self.building
    }

    #[cfg(test)]
    pub fn is_queued(&self) -> bool {
        self.rebuild_again
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
