//! `ondemand clean`: remove compiled pages.

use std::fs;

use anyhow::{Context, Result, bail};

use crate::config::SiteConfig;
use crate::log;

/// Remove the output directory. Refuses to delete the project root or the
/// pages directory.
pub fn clean_output(config: &SiteConfig) -> Result<()> {
    let output = &config.build.output;
    if output == config.get_root() || config.build.pages.starts_with(output) {
        bail!(
            "refusing to remove {}: it contains the project or its pages",
            output.display()
        );
    }

    if !output.exists() {
        log!("clean"; "nothing to remove");
        return Ok(());
    }

    fs::remove_dir_all(output).with_context(|| format!("failed to remove {}", output.display()))?;
    log!("clean"; "removed {}", config.root_relative(output).display());
    Ok(())
}
