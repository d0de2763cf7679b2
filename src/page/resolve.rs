//! Filesystem page resolver.
//!
//! ```text
//! /            -> pages/index.md
//! /blog        -> pages/blog.md | pages/blog/index.md
//! /docs/intro  -> pages/docs/intro.md | pages/docs/intro/index.md
//! ```
//!
//! Extensions are tried in configured order; a direct file wins over a
//! directory index.

use std::ffi::OsString;
use std::path::PathBuf;

use super::{PageResolver, ResolveError, ResolvedPage};
use crate::config::SiteConfig;
use crate::core::{PageId, unit_name};

#[derive(Debug, Clone)]
pub struct FsPageResolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsPageResolver {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(
            config.build.pages.clone(),
            config.build.page_extensions.clone(),
        )
    }

    /// Candidate source paths in lookup order.
    fn candidates(&self, page: &PageId) -> Vec<PathBuf> {
        let mut base = self.root.clone();
        base.extend(page.segments());

        let mut candidates = Vec::with_capacity(self.extensions.len() * 2);
        for ext in &self.extensions {
            if page.is_root() {
                candidates.push(self.root.join(format!("index.{ext}")));
                continue;
            }
            let mut file: OsString = base.clone().into_os_string();
            file.push(".");
            file.push(ext);
            candidates.push(PathBuf::from(file));
        }
        if !page.is_root() {
            for ext in &self.extensions {
                candidates.push(base.join(format!("index.{ext}")));
            }
        }
        candidates
    }
}

impl PageResolver for FsPageResolver {
    fn resolve(&self, page: &PageId) -> Result<ResolvedPage, ResolveError> {
        if page.has_relative_segments() {
            return Err(ResolveError::Invalid(page.to_string()));
        }

        self.candidates(page)
            .into_iter()
            .find(|path| path.is_file())
            .map(|source_path| ResolvedPage {
                unit_name: unit_name(page),
                source_path,
            })
            .ok_or_else(|| ResolveError::NotFound(page.clone()))
    }
}
