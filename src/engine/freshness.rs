//! Mtime-based freshness for compiled units.
//!
//! A unit is fresh when its artifact exists and none of the files it was
//! compiled from changed since.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rustc_hash::FxHashMap;

/// Get the modification time of a file
///
/// Returns `None` if the file doesn't exist or mtime cannot be read
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

#[derive(Debug, Clone)]
struct Stamp {
    inputs: Vec<(PathBuf, Option<SystemTime>)>,
    artifact: PathBuf,
}

/// Input stamps of the last successful compile, per unit.
#[derive(Debug, Default)]
pub struct FreshnessCache {
    units: FxHashMap<String, Stamp>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self, unit: &str) -> bool {
        let Some(stamp) = self.units.get(unit) else {
            return false;
        };
        stamp.artifact.exists()
            && stamp
                .inputs
                .iter()
                .all(|(path, mtime)| mtime.is_some() && get_mtime(path) == *mtime)
    }

    /// Record a successful compile of `unit` from `inputs`.
    pub fn record(&mut self, unit: &str, inputs: &[PathBuf], artifact: &Path) {
        let inputs = inputs.iter().map(|p| (p.clone(), get_mtime(p))).collect();
        self.units.insert(
            unit.to_string(),
            Stamp {
                inputs,
                artifact: artifact.to_path_buf(),
            },
        );
    }

    pub fn forget(&mut self, unit: &str) {
        self.units.remove(unit);
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.units.len()
    }
}
