//! Page resolution.
//!
//! Maps a page identifier to the build unit that compiles it and the source
//! file it compiles from. The scheduler only depends on [`PageResolver`].

mod resolve;

pub use resolve::FsPageResolver;

use std::path::PathBuf;

use thiserror::Error;

use crate::core::PageId;

/// Looks up the source of a page.
pub trait PageResolver: Send + Sync {
    fn resolve(&self, page: &PageId) -> Result<ResolvedPage, ResolveError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPage {
    pub unit_name: String,
    /// Absolute path of the page source.
    pub source_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no source for {0}")]
    NotFound(PageId),

    #[error("{0}")]
    Invalid(String),
}
