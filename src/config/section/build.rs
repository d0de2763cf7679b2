//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! pages = "pages"                      # Page sources (relative to project root)
//! output = ".ondemand"                 # Compiled units (relative to project root)
//! page_extensions = ["md", "markdown"] # Tried in order when resolving a page
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Page source directory.
    pub pages: PathBuf,

    /// Build output directory.
    pub output: PathBuf,

    /// Source extensions, without the leading dot.
    pub page_extensions: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pages: "pages".into(),
            output: ".ondemand".into(),
            page_extensions: vec!["md".into(), "markdown".into()],
        }
    }
}

impl BuildConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.page_extensions.is_empty() {
            diag.error(
                FieldPath::new("build.page_extensions"),
                "at least one extension is required",
            );
        }
        for ext in &self.page_extensions {
            if ext.is_empty() || ext.starts_with('.') {
                diag.error_with_hint(
                    FieldPath::new("build.page_extensions"),
                    format!("invalid extension `{ext}`"),
                    "write extensions without the leading dot, e.g. \"md\"",
                );
            }
        }
        if self.pages == self.output {
            diag.error(
                FieldPath::new("build.output"),
                "output directory must differ from the pages directory",
            );
        }
    }
}
