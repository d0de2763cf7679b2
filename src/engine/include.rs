//! `{{ include "path" }}` expansion.
//!
//! Paths are relative to the pages root. Included files may include others,
//! up to [`MAX_INCLUDE_DEPTH`] levels.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

pub const MAX_INCLUDE_DEPTH: usize = 8;

static INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*include\s+"([^"]+)"\s*\}\}"#).expect("include pattern is valid")
});

#[derive(Debug)]
pub enum IncludeError {
    /// An included file does not exist. `depth` counts the include chain
    /// leading to it, starting at 1 for a direct include.
    Missing { module: String, depth: usize },
    Io { module: String, error: io::Error },
    TooDeep { module: String },
}

/// Expand includes in `source`. Every file read is appended to `deps`.
pub fn expand(source: &str, pages_root: &Path, deps: &mut Vec<PathBuf>) -> Result<String, IncludeError> {
    expand_at(source, pages_root, 1, deps)
}

fn expand_at(
    source: &str,
    pages_root: &Path,
    depth: usize,
    deps: &mut Vec<PathBuf>,
) -> Result<String, IncludeError> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for caps in INCLUDE.captures_iter(source) {
        let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&source[last..whole.start()]);
        last = whole.end();

        let module = target.as_str().trim_start_matches('/').to_string();
        if depth > MAX_INCLUDE_DEPTH {
            return Err(IncludeError::TooDeep { module });
        }

        let path = pages_root.join(&module);
        let included = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IncludeError::Missing { module, depth });
            }
            Err(error) => return Err(IncludeError::Io { module, error }),
        };
        deps.push(path);
        out.push_str(&expand_at(&included, pages_root, depth + 1, deps)?);
    }

    out.push_str(&source[last..]);
    Ok(out)
}
