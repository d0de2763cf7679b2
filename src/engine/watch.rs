//! Source watcher.
//!
//! ```text
//! notify ─> Debouncer (timing + dedup) ─> on_change(changes)
//! ```
//!
//! The watcher never builds anything itself; the callback decides whether a
//! change invalidates pages or needs a reload.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;

use crate::debug;

pub const DEBOUNCE_MS: u64 = 300;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

// =============================================================================
// Debouncer
// =============================================================================

/// Collects events until the filesystem has been quiet for `DEBOUNCE_MS`.
struct Debouncer {
    changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
        }
    }

    /// Add a notify event, applying dedup rules:
    /// - Removed then Created/Modified: restored, keep the new kind
    /// - Modified then Removed: deleted
    /// - Created then Removed: never existed, dropped
    /// - otherwise the first event wins
    fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            // Metadata-only changes (mtime/atime/chmod) are noise.
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => ChangeKind::Modified,
            _ => return,
        };

        for path in event.paths.iter().filter(|p| !is_temp_file(p)) {
            self.add(path.clone(), kind);
        }
    }

    fn add(&mut self, path: PathBuf, kind: ChangeKind) {
        self.last_event = Some(Instant::now());
        match (self.changes.get(&path).copied(), kind) {
            (None, _) => {
                self.changes.insert(path, kind);
            }
            (Some(ChangeKind::Removed), ChangeKind::Created | ChangeKind::Modified) => {
                self.changes.insert(path, kind);
            }
            (Some(ChangeKind::Modified), ChangeKind::Removed) => {
                self.changes.insert(path, ChangeKind::Removed);
            }
            (Some(ChangeKind::Created), ChangeKind::Removed) => {
                self.changes.remove(&path);
            }
            _ => {}
        }
    }

    fn is_ready(&self, now: Instant) -> bool {
        self.last_event
            .is_some_and(|last| now.duration_since(last) >= Duration::from_millis(DEBOUNCE_MS))
    }

    /// Take the collected changes once the debounce window has passed.
    fn take_if_ready(&mut self, now: Instant) -> Option<Vec<Change>> {
        if !self.is_ready(now) {
            return None;
        }
        self.last_event = None;

        let mut changes: Vec<_> = self
            .changes
            .drain()
            .map(|(path, kind)| Change { path, kind })
            .collect();
        if changes.is_empty() {
            return None;
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Some(changes)
    }

    /// Time until the pending batch may be flushed.
    fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(3600);
        };
        Duration::from_millis(DEBOUNCE_MS)
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

// =============================================================================
// Watcher
// =============================================================================

/// Running watcher. Dropping it stops the debounce thread.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl SourceWatcher {
    /// Watch `paths` (directories recursively, files directly). Missing paths
    /// are skipped.
    pub fn start<F>(paths: &[PathBuf], on_change: F) -> notify::Result<Self>
    where
        F: Fn(Vec<Change>) + Send + 'static,
    {
        let (event_tx, event_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(res);
        })?;
        for path in paths.iter().filter(|p| p.exists()) {
            let mode = if path.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(path, mode)?;
            debug!("watch"; "watching {}", path.display());
        }

        let thread = thread::Builder::new()
            .name("ondemand-watch".into())
            .spawn(move || {
                let mut debouncer = Debouncer::new();
                loop {
                    channel::select! {
                        recv(event_rx) -> msg => match msg {
                            Ok(Ok(event)) => debouncer.add_event(&event),
                            Ok(Err(e)) => crate::log!("watch"; "notify error: {}", e),
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                        default(debouncer.sleep_duration()) => {
                            if let Some(changes) = debouncer.take_if_ready(Instant::now()) {
                                on_change(changes);
                            }
                        }
                    }
                }
            })
            .map_err(notify::Error::io)?;

        Ok(Self {
            _watcher: watcher,
            stop_tx,
            thread: Some(thread),
        })
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.thread.take()
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }
}
