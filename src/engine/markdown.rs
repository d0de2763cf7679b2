//! Markdown build engine.
//!
//! A single worker thread runs build passes. Invalidations that arrive while
//! a pass is running are merged into one follow-up pass.
//!
//! ```text
//! invalidate_watch ─> [Invalidate] ─> worker ─> build_started
//!                                              before_build   (units)
//!                                              compile        (rayon)
//!                                              after_build    (report)
//! ```
//!
//! Each unit compiles `<pages>/<page>.md` (with includes expanded) to
//! `<output>/<unit>.html`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use arc_swap::ArcSwap;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use pulldown_cmark::{Options, Parser, html};
use rayon::prelude::*;

use super::freshness::FreshnessCache;
use super::include::{self, IncludeError};
use super::{
    BuildEngine, BuildError, BuildErrorKind, BuildHooks, BuildPass, BuildReport, BuildUnit,
    ModuleInfo,
};
use crate::config::{ConfigError, SiteConfig};
use crate::core::page_from_unit;
use crate::logger::{status_error, status_success, status_unchanged};
use crate::{debug, log};

enum EngineMsg {
    Invalidate,
    Shutdown,
}

/// State shared between the engine handle and its worker.
struct Shared {
    hooks: Mutex<Option<Weak<dyn BuildHooks>>>,
    config: ArcSwap<SiteConfig>,
    cache: Mutex<FreshnessCache>,
}

pub struct MarkdownEngine {
    tx: Sender<EngineMsg>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MarkdownEngine {
    /// Spawn the worker thread.
    pub fn start(config: Arc<SiteConfig>) -> Result<Arc<Self>> {
        let (tx, rx) = channel::unbounded();
        let shared = Arc::new(Shared {
            hooks: Mutex::new(None),
            config: ArcSwap::new(config),
            cache: Mutex::new(FreshnessCache::new()),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("ondemand-engine".into())
            .spawn(move || worker_shared.run(&rx))
            .context("failed to spawn engine worker")?;

        Ok(Arc::new(Self {
            tx,
            shared,
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Where the compiled HTML of `unit` is written.
    pub fn artifact_path(&self, unit: &str) -> PathBuf {
        artifact_path(&self.shared.config.load().build.output, unit)
    }

    /// The configuration the engine currently builds with.
    pub fn config(&self) -> Arc<SiteConfig> {
        self.shared.config.load_full()
    }

    /// Stop the worker after the pass in progress, if any.
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineMsg::Shutdown);
        if let Some(worker) = self.worker.lock().take()
            && worker.thread().id() != thread::current().id()
        {
            let _ = worker.join();
        }
    }
}

impl Drop for MarkdownEngine {
    fn drop(&mut self) {
        let _ = self.tx.send(EngineMsg::Shutdown);
    }
}

impl BuildEngine for MarkdownEngine {
    fn attach(&self, hooks: Weak<dyn BuildHooks>) {
        *self.shared.hooks.lock() = Some(hooks);
    }

    fn invalidate_watch(&self) {
        let _ = self.tx.send(EngineMsg::Invalidate);
    }

    fn full_reload(&self) -> Result<()> {
        let current = self.shared.config.load_full();
        let config = current
            .reload()
            .with_context(|| format!("reloading {}", current.config_path.display()))?;

        if !config.build.pages.is_dir() {
            bail!(ConfigError::Validation(format!(
                "pages directory not found: {}",
                config.build.pages.display()
            )));
        }

        self.shared.cache.lock().clear();

        self.shared.config.store(Arc::new(config));
        debug!("reload"; "engine state cleared");
        Ok(())
    }
}

// =============================================================================
// Worker
// =============================================================================

impl Shared {
    fn run(&self, rx: &Receiver<EngineMsg>) {
        while let Ok(msg) = rx.recv() {
            if matches!(msg, EngineMsg::Shutdown) {
                break;
            }
            // Merge everything queued so far into this pass.
            let mut shutdown = false;
            for pending in rx.try_iter() {
                shutdown |= matches!(pending, EngineMsg::Shutdown);
            }
            self.run_pass();
            if shutdown {
                break;
            }
        }
        debug!("build"; "engine worker stopped");
    }

    fn run_pass(&self) {
        let Some(hooks) = self.hooks.lock().as_ref().and_then(Weak::upgrade) else {
            return;
        };

        hooks.build_started();
        let mut pass = BuildPass::new();
        hooks.before_build(&mut pass);

        let report = self.compile(pass.units());
        show_status(&report, pass.units().len());
        hooks.after_build(&report);
    }

    fn compile(&self, units: &[BuildUnit]) -> BuildReport {
        let config = self.config.load_full();
        let outcomes: Vec<_> = units
            .par_iter()
            .map(|unit| (unit, self.compile_unit(unit, &config)))
            .collect();

        let mut report = BuildReport::default();
        for (unit, outcome) in outcomes {
            match outcome {
                Ok(()) => report.completed.push(unit.name.clone()),
                Err(error) => {
                    self.cache.lock().forget(&unit.name);
                    report.errors.push(error);
                }
            }
        }
        report
    }

    fn compile_unit(&self, unit: &BuildUnit, config: &SiteConfig) -> Result<(), BuildError> {
        if self.cache.lock().is_fresh(&unit.name) {
            return Ok(());
        }

        let source = fs::read_to_string(&unit.source).map_err(|e| {
            let kind = if e.kind() == io::ErrorKind::NotFound {
                BuildErrorKind::ModuleNotFound
            } else {
                BuildErrorKind::Io
            };
            unit_error(unit, kind, &unit.name, 0, format!("{}: {e}", unit.source.display()))
        })?;

        let mut inputs = vec![unit.source.clone()];
        let expanded = include::expand(&source, &config.build.pages, &mut inputs)
            .map_err(|e| include_error(unit, e))?;

        let title = page_from_unit(&unit.name)
            .map(|page| page.to_string())
            .unwrap_or_else(|| unit.name.clone());
        let document = render(&title, &expanded);

        let artifact = artifact_path(&config.build.output, &unit.name);
        write_artifact(&artifact, &document).map_err(|e| {
            unit_error(
                unit,
                BuildErrorKind::Io,
                &unit.name,
                0,
                format!("{}: {e}", artifact.display()),
            )
        })?;

        self.cache.lock().record(&unit.name, &inputs, &artifact);
        debug!("build"; "{} -> {}", unit.name, artifact.display());
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn artifact_path(output: &Path, unit: &str) -> PathBuf {
    output.join(format!("{unit}.html"))
}

fn render(title: &str, markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES;

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_text(title),
        body
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn write_artifact(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn unit_error(
    unit: &BuildUnit,
    kind: BuildErrorKind,
    module: &str,
    dependencies: usize,
    message: String,
) -> BuildError {
    BuildError {
        kind,
        module: ModuleInfo {
            name: module.to_string(),
            dependencies,
        },
        units: vec![unit.name.clone()],
        message,
    }
}

fn include_error(unit: &BuildUnit, error: IncludeError) -> BuildError {
    match error {
        IncludeError::Missing { module, depth } => unit_error(
            unit,
            BuildErrorKind::ModuleNotFound,
            &module,
            depth,
            "included file not found".into(),
        ),
        IncludeError::Io { module, error } => {
            unit_error(unit, BuildErrorKind::Io, &module, 0, error.to_string())
        }
        IncludeError::TooDeep { module } => unit_error(
            unit,
            BuildErrorKind::Other,
            &module,
            include::MAX_INCLUDE_DEPTH,
            format!("includes nested deeper than {}", include::MAX_INCLUDE_DEPTH),
        ),
    }
}

fn show_status(report: &BuildReport, submitted: usize) {
    if submitted == 0 {
        return;
    }

    if let Some(first) = report.errors.first() {
        let failed: Vec<_> = report
            .errors
            .iter()
            .flat_map(|e| e.units.iter())
            .filter_map(|unit| page_from_unit(unit))
            .map(|page| page.to_string())
            .collect();
        let detail = match report.errors.len() {
            1 => first.to_string(),
            n => format!("{first}\n(+{} more)", n - 1),
        };
        status_error(&format!("failed: {}", failed.join(", ")), &detail);
        log!("build"; "{} error(s), {} unit(s) built", report.errors.len(), report.completed.len());
        return;
    }

    let built: Vec<_> = report
        .completed
        .iter()
        .filter_map(|unit| page_from_unit(unit))
        .map(|page| page.to_string())
        .collect();
    if built.is_empty() {
        status_unchanged("nothing to build");
    } else {
        status_success(&format!("built {}", built.join(", ")));
    }
}

#[cfg(test)]
mod tests;
