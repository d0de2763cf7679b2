//! Build engine interface.
//!
//! The scheduler never looks inside the engine. It only sees:
//!
//! ```text
//! invalidate_watch() ──> engine pass ──> build_started()
//!                                        before_build(&mut BuildPass)   submit units
//!                                        ... compile ...
//!                                        after_build(&BuildReport)      results
//! ```
//!
//! # Modules
//!
//! - `markdown` - Reference engine compiling Markdown pages to HTML
//! - `include` - `{{ include "path" }}` expansion
//! - `freshness` - Skips units whose inputs did not change
//! - `watch` - Debounced source watcher that re-triggers passes

mod freshness;
mod include;
pub mod markdown;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Weak;

pub use markdown::MarkdownEngine;

// =============================================================================
// Traits
// =============================================================================

/// Callbacks the engine invokes around every build pass.
pub trait BuildHooks: Send + Sync {
    /// A pass is starting (the engine considers its state invalid).
    fn build_started(&self);

    /// Runs once per pass, before compilation. Submit units to `pass`.
    fn before_build(&self, pass: &mut BuildPass);

    /// Runs once per pass, after compilation.
    fn after_build(&self, report: &BuildReport);
}

/// The opaque compiler/bundler driven by the scheduler.
pub trait BuildEngine: Send + Sync {
    /// Register the hooks for subsequent passes.
    fn attach(&self, hooks: Weak<dyn BuildHooks>);

    /// Mark the current output invalid and schedule a new pass.
    fn invalidate_watch(&self);

    /// Throw away all engine state and reload configuration.
    fn full_reload(&self) -> anyhow::Result<()>;
}

// =============================================================================
// Build Pass
// =============================================================================

/// One unit of work submitted for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
    pub name: String,
    pub source: PathBuf,
}

/// Units collected by the pre-build hook.
#[derive(Debug, Default)]
pub struct BuildPass {
    units: Vec<BuildUnit>,
}

impl BuildPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a unit for compilation in this pass.
    pub fn submit_unit(&mut self, name: &str, source: &Path) {
        if self.units.iter().any(|u| u.name == name) {
            return;
        }
        self.units.push(BuildUnit {
            name: name.to_string(),
            source: source.to_path_buf(),
        });
    }

    pub fn units(&self) -> &[BuildUnit] {
        &self.units
    }
}

// =============================================================================
// Build Report
// =============================================================================

/// Outcome of a pass, handed to `after_build`.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Units compiled without errors.
    pub completed: Vec<String>,
    pub errors: Vec<BuildError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// A module or file could not be found.
    ModuleNotFound,
    /// Reading or writing failed for another reason.
    Io,
    Other,
}

impl BuildErrorKind {
    #[inline]
    pub fn is_missing_module(self) -> bool {
        matches!(self, Self::ModuleNotFound)
    }
}

/// The module an error was raised for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    /// Length of the dependency chain that led to this module
    /// (0 = the module is itself a top-level unit).
    pub dependencies: usize,
}

#[derive(Debug, Clone)]
pub struct BuildError {
    pub kind: BuildErrorKind,
    pub module: ModuleInfo,
    /// Units the failing module belongs to.
    pub units: Vec<String>,
    pub message: String,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.module.name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pass_dedup() {
        let mut pass = BuildPass::new();
        pass.submit_unit("pages/a", Path::new("/src/a.md"));
        pass.submit_unit("pages/a", Path::new("/src/a.md"));
        pass.submit_unit("pages/b", Path::new("/src/b.md"));
        assert_eq!(pass.units().len(), 2);
        assert_eq!(pass.units()[1].name, "pages/b");
    }
}
