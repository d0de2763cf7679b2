//! Entry registry: the scheduler's record of every known page.

use std::path::PathBuf;
use std::time::Instant;

use rustc_hash::FxHashMap;

use super::error::RegistryError;
use crate::core::PageId;

// =============================================================================
// Entry
// =============================================================================

/// Build state of a page.
///
/// Moves `Added -> Building -> Built` within a cycle. A `Built` entry is
/// re-submitted as `Building` by the next pass; it never returns to `Added`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Added,
    Building,
    Built,
}

#[derive(Debug, Clone)]
pub struct Entry {
    /// Build-unit name (names the engine's output).
    pub name: String,
    pub source_path: PathBuf,
    pub status: EntryStatus,
    pub last_active: Instant,
    /// Latest non-fatal error reported for this unit.
    pub last_error: Option<String>,
}

impl Entry {
    /// Mark as submitted to the current pass.
    pub fn mark_building(&mut self) {
        self.status = match self.status {
            EntryStatus::Added | EntryStatus::Building | EntryStatus::Built => {
                EntryStatus::Building
            }
        };
    }

    /// Promote a building entry. Returns false if the entry was not building.
    pub fn mark_built(&mut self, now: Instant) -> bool {
        match self.status {
            EntryStatus::Building => {
                self.status = EntryStatus::Built;
                self.last_active = now;
                self.last_error = None;
                true
            }
            EntryStatus::Added | EntryStatus::Built => false,
        }
    }

    #[inline]
    pub fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.status == EntryStatus::Built
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Exclusive owner of entry lifetimes.
#[derive(Debug, Default)]
pub struct EntryRegistry {
    entries: FxHashMap<PageId, Entry>,
}

impl EntryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry in `Added` state. Fails if the page is already known.
    pub fn create(
        &mut self,
        page: PageId,
        name: String,
        source_path: PathBuf,
        now: Instant,
    ) -> Result<&mut Entry, RegistryError> {
        use std::collections::hash_map::Entry as Slot;

        match self.entries.entry(page) {
            Slot::Occupied(slot) => Err(RegistryError::AlreadyExists(slot.key().clone())),
            Slot::Vacant(slot) => Ok(slot.insert(Entry {
                name,
                source_path,
                status: EntryStatus::Added,
                last_active: now,
                last_error: None,
            })),
        }
    }

    pub fn get(&self, page: &PageId) -> Option<&Entry> {
        self.entries.get(page)
    }

    pub fn get_mut(&mut self, page: &PageId) -> Option<&mut Entry> {
        self.entries.get_mut(page)
    }

    pub fn delete(&mut self, page: &PageId) -> Option<Entry> {
        self.entries.remove(page)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PageId, &Entry)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PageId, &mut Entry)> {
        self.entries.iter_mut()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
