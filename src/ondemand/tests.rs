//! Scheduler tests.
//!
//! Passes are driven by hand through the `BuildHooks` impl, so every test
//! controls exactly when a pass starts and what it reports.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use tempfile::TempDir;

use super::*;
use crate::engine::{
    BuildError, BuildErrorKind, BuildHooks, BuildPass, BuildReport, ModuleInfo,
};
use crate::page::FsPageResolver;

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Default)]
struct FakeEngine {
    triggers: AtomicUsize,
    reloads: AtomicUsize,
    fail_reload: bool,
    /// When set, `full_reload` blocks until a message arrives.
    gate: Option<Receiver<()>>,
}

impl FakeEngine {
    fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }

    fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl BuildEngine for FakeEngine {
    fn attach(&self, _hooks: Weak<dyn BuildHooks>) {}

    fn invalidate_watch(&self) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
    }

    fn full_reload(&self) -> anyhow::Result<()> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reload {
            anyhow::bail!("config no longer parses");
        }
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    engine: Arc<FakeEngine>,
    scheduler: Arc<Scheduler>,
}

impl Fixture {
    fn pages(&self) -> PathBuf {
        self.dir.path().join("pages")
    }

    fn write_page(&self, rel: &str) {
        let path = self.pages().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "# page").unwrap();
    }
}

fn options() -> SchedulerOptions {
    SchedulerOptions {
        max_inactive_age: Duration::from_secs(60),
        pages_buffer_length: 2,
        // Sweeps are triggered by hand.
        dispose_interval: Duration::from_secs(3600),
    }
}

fn fixture_with(engine: FakeEngine, fatal: FatalHandler, pages: &[&str]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("pages");
    fs::create_dir_all(&root).unwrap();
    for rel in pages {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "# page").unwrap();
    }

    let engine = Arc::new(engine);
    let resolver = Arc::new(FsPageResolver::new(&root, vec!["md".into()]));
    let scheduler = Scheduler::start_with(engine.clone(), resolver, options(), fatal);
    Fixture {
        dir,
        engine,
        scheduler,
    }
}

fn fixture(pages: &[&str]) -> Fixture {
    fixture_with(
        FakeEngine::default(),
        Box::new(|e: &anyhow::Error| panic!("unexpected fatal: {e:#}")),
        pages,
    )
}

/// Run one full pass. Returns the submitted unit names.
fn run_pass(scheduler: &Scheduler, completed: &[&str], errors: Vec<BuildError>) -> Vec<String> {
    scheduler.build_started();
    let mut pass = BuildPass::new();
    scheduler.before_build(&mut pass);
    let submitted = pass.units().iter().map(|u| u.name.clone()).collect();
    scheduler.after_build(&BuildReport {
        completed: completed.iter().map(|s| s.to_string()).collect(),
        errors,
    });
    submitted
}

fn missing(module: &str, dependencies: usize, unit: &str) -> BuildError {
    BuildError {
        kind: BuildErrorKind::ModuleNotFound,
        module: ModuleInfo {
            name: module.into(),
            dependencies,
        },
        units: vec![unit.into()],
        message: "not found".into(),
    }
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Build `page` to completion through one pass. Like a real engine, the pass
/// completes every submitted unit, so pages built earlier stay `Built`.
fn build(f: &Fixture, page: &str) {
    let wait = f.scheduler.request_page(&PageId::new(page)).unwrap();
    f.scheduler.build_started();
    let mut pass = BuildPass::new();
    f.scheduler.before_build(&mut pass);
    let completed = pass.units().iter().map(|u| u.name.clone()).collect();
    f.scheduler.after_build(&BuildReport {
        completed,
        errors: vec![],
    });
    wait.wait().unwrap();
}

// =============================================================================
// ensure_page
// =============================================================================

#[test]
fn test_blog_scenario() {
    let f = fixture(&["blog.md"]);
    let blog = PageId::new("/blog");

    let wait = f.scheduler.request_page(&blog).unwrap();
    assert!(!wait.is_ready());
    assert_eq!(f.scheduler.entry_status(&blog), Some(EntryStatus::Added));
    assert_eq!(f.engine.triggers(), 1);

    f.scheduler.build_started();
    let mut pass = BuildPass::new();
    f.scheduler.before_build(&mut pass);
    assert_eq!(pass.units().len(), 1);
    assert_eq!(pass.units()[0].name, "pages/blog");
    assert_eq!(pass.units()[0].source, f.pages().join("blog.md"));
    assert_eq!(f.scheduler.entry_status(&blog), Some(EntryStatus::Building));

    let before_completion = Instant::now();
    f.scheduler.after_build(&BuildReport {
        completed: vec!["pages/blog".into()],
        errors: vec![],
    });

    assert_eq!(wait.wait(), Ok(()));
    assert_eq!(f.scheduler.entry_status(&blog), Some(EntryStatus::Built));
    let last_active = f.scheduler.state.lock().registry.get(&blog).unwrap().last_active;
    assert!(last_active >= before_completion);

    // Built pages return immediately.
    assert_eq!(f.scheduler.ensure_page(&blog), Ok(()));
    assert_eq!(f.engine.triggers(), 1);
}

#[test]
fn test_concurrent_requests_share_one_submission() {
    let f = fixture(&["a.md"]);
    let page = PageId::new("/a");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = f.scheduler.clone();
            let page = page.clone();
            thread::spawn(move || scheduler.ensure_page(&page))
        })
        .collect();

    wait_for(|| f.scheduler.waiter_count(&page) == 4);
    assert_eq!(f.scheduler.entry_count(), 1);
    assert_eq!(f.engine.triggers(), 1);

    let submitted = run_pass(&f.scheduler, &["pages/a"], vec![]);
    assert_eq!(submitted, vec!["pages/a"]);

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(()));
    }
    assert_eq!(f.scheduler.waiter_count(&page), 0);
}

#[test]
fn test_normalized_ids_share_an_entry() {
    let f = fixture(&["docs/index.md"]);
    let _first = f.scheduler.request_page(&PageId::new("/docs")).unwrap();
    let _second = f.scheduler.request_page(&PageId::new("/docs/index")).unwrap();
    assert_eq!(f.scheduler.entry_count(), 1);
    assert_eq!(f.scheduler.waiter_count(&PageId::new("/docs")), 2);
}

#[test]
fn test_page_not_found() {
    let f = fixture(&[]);
    let result = f.scheduler.ensure_page(&PageId::new("/missing"));
    assert_eq!(result, Err(OnDemandError::PageNotFound(PageId::new("/missing"))));
    assert_eq!(f.scheduler.entry_count(), 0);
    assert_eq!(f.engine.triggers(), 0);
}

#[test]
fn test_invalid_page() {
    let f = fixture(&[]);
    let result = f.scheduler.ensure_page(&PageId::new("/../secret"));
    assert!(matches!(result, Err(OnDemandError::InvalidPage(_))));
}

#[test]
fn test_wait_timeout_reports_page() {
    let f = fixture(&["slow.md"]);
    let page = PageId::new("/slow");
    let wait = f.scheduler.request_page(&page).unwrap();
    assert_eq!(
        wait.wait_timeout(Duration::from_millis(20)),
        Err(OnDemandError::Timeout(page))
    );
}

// =============================================================================
// Invalidation
// =============================================================================

#[test]
fn test_invalidations_during_build_coalesce() {
    let f = fixture(&["a.md"]);
    let _wait = f.scheduler.request_page(&PageId::new("/a")).unwrap();
    assert_eq!(f.engine.triggers(), 1);

    f.scheduler.build_started();
    let mut pass = BuildPass::new();
    f.scheduler.before_build(&mut pass);

    for _ in 0..5 {
        f.scheduler.invalidate();
    }
    assert_eq!(f.engine.triggers(), 1);

    f.scheduler.after_build(&BuildReport {
        completed: vec!["pages/a".into()],
        errors: vec![],
    });
    // Exactly one follow-up cycle.
    assert_eq!(f.engine.triggers(), 2);

    run_pass(&f.scheduler, &["pages/a"], vec![]);
    assert_eq!(f.engine.triggers(), 2);
}

#[test]
fn test_built_entries_are_resubmitted() {
    let f = fixture(&["a.md"]);
    build(&f, "/a");

    let submitted = run_pass(&f.scheduler, &[], vec![]);
    assert_eq!(submitted, vec!["pages/a"]);
    // Not completed in this pass, still tracked.
    assert_eq!(
        f.scheduler.entry_status(&PageId::new("/a")),
        Some(EntryStatus::Building)
    );
}

#[test]
fn test_transient_error_keeps_waiters() {
    let f = fixture(&["a.md"]);
    let page = PageId::new("/a");
    let wait = f.scheduler.request_page(&page).unwrap();

    run_pass(&f.scheduler, &[], vec![missing("partials/nav.md", 1, "pages/a")]);

    assert_eq!(f.scheduler.waiter_count(&page), 1);
    assert_eq!(f.scheduler.entry_status(&page), Some(EntryStatus::Building));
    assert_eq!(
        f.scheduler.last_error(&page).as_deref(),
        Some("partials/nav.md: not found")
    );
    assert!(!f.scheduler.is_reloading());

    // Fixed on the next pass.
    run_pass(&f.scheduler, &["pages/a"], vec![]);
    assert_eq!(wait.wait(), Ok(()));
    assert_eq!(f.scheduler.last_error(&page), None);
}

// =============================================================================
// Vanished Sources
// =============================================================================

#[test]
fn test_vanished_source_is_dropped() {
    let f = fixture(&["a.md", "b.md"]);
    build(&f, "/a");
    build(&f, "/b");
    assert_eq!(f.scheduler.entry_count(), 2);

    fs::remove_file(f.pages().join("a.md")).unwrap();
    let submitted = run_pass(&f.scheduler, &["pages/b"], vec![]);

    assert_eq!(submitted, vec!["pages/b"]);
    assert_eq!(f.scheduler.entry_status(&PageId::new("/a")), None);
    assert_eq!(f.scheduler.entry_count(), 1);
    assert!(!f.scheduler.is_reloading());
}

#[test]
fn test_vanished_source_fails_its_waiters() {
    let f = fixture(&["a.md"]);
    let wait = f.scheduler.request_page(&PageId::new("/a")).unwrap();

    fs::remove_file(f.pages().join("a.md")).unwrap();
    run_pass(&f.scheduler, &[], vec![]);

    assert_eq!(
        wait.wait(),
        Err(OnDemandError::PageNotFound(PageId::new("/a")))
    );
}

#[test]
fn test_recreated_source_is_requested_again() {
    let f = fixture(&["a.md"]);
    build(&f, "/a");

    fs::remove_file(f.pages().join("a.md")).unwrap();
    run_pass(&f.scheduler, &[], vec![]);
    assert_eq!(f.scheduler.entry_count(), 0);

    f.write_page("a.md");
    let wait = f.scheduler.request_page(&PageId::new("/a")).unwrap();
    assert_eq!(
        f.scheduler.entry_status(&PageId::new("/a")),
        Some(EntryStatus::Added)
    );
    run_pass(&f.scheduler, &["pages/a"], vec![]);
    assert_eq!(wait.wait(), Ok(()));
}

// =============================================================================
// Ping and Disposal
// =============================================================================

#[test]
fn test_ping_unknown_page_is_invalid() {
    let f = fixture(&[]);
    assert_eq!(
        f.scheduler.handle_ping(&PageId::new("/nope")),
        PingResponse::Invalid
    );
    assert!(f.scheduler.recent_pages().is_empty());
}

#[test]
fn test_ping_fills_recency_buffer() {
    let f = fixture(&["a.md", "b.md", "c.md"]);
    for page in ["/a", "/b", "/c"] {
        build(&f, page);
    }

    for page in ["/a", "/b", "/c"] {
        assert_eq!(
            f.scheduler.handle_ping(&PageId::new(page)),
            PingResponse::Success
        );
    }
    assert_eq!(
        f.scheduler.recent_pages(),
        vec![PageId::new("/c"), PageId::new("/b")]
    );
    // Dropped from the buffer only.
    assert_eq!(f.scheduler.entry_count(), 3);
}

#[test]
fn test_ping_pending_page_is_not_tracked() {
    let f = fixture(&["a.md"]);
    let _wait = f.scheduler.request_page(&PageId::new("/a")).unwrap();
    assert_eq!(
        f.scheduler.handle_ping(&PageId::new("/a")),
        PingResponse::Success
    );
    assert!(f.scheduler.recent_pages().is_empty());
}

#[test]
fn test_ping_built_error_page_is_invalid_but_tracked() {
    let f = fixture(&["_error.md"]);
    let error_page = PageId::new("/_error");
    build(&f, "/_error");

    let long_ago = Instant::now();
    f.scheduler.set_last_active(&error_page, long_ago);
    thread::sleep(Duration::from_millis(5));

    assert_eq!(f.scheduler.handle_ping(&error_page), PingResponse::Invalid);
    assert_eq!(f.scheduler.recent_pages(), vec![error_page.clone()]);
    let last_active = f.scheduler.state.lock().registry.get(&error_page).unwrap().last_active;
    assert!(last_active > long_ago);
}

#[test]
fn test_dispose_evicts_cold_pages_only() {
    let f = fixture(&["a.md", "b.md", "c.md", "d.md"]);
    for page in ["/a", "/b", "/c"] {
        build(&f, page);
    }
    // /d is still pending.
    let _pending = f.scheduler.request_page(&PageId::new("/d")).unwrap();

    f.scheduler.handle_ping(&PageId::new("/a"));
    f.scheduler.handle_ping(&PageId::new("/b"));

    let long_ago = Instant::now();
    for page in ["/a", "/b", "/c"] {
        f.scheduler.set_last_active(&PageId::new(page), long_ago);
    }

    let triggers = f.engine.triggers();
    let later = long_ago + Duration::from_secs(120);
    let disposed = f.scheduler.dispose_inactive(later);

    assert_eq!(disposed, vec![PageId::new("/c")]);
    assert_eq!(f.scheduler.entry_count(), 3);
    assert_eq!(
        f.scheduler.entry_status(&PageId::new("/d")),
        Some(EntryStatus::Added)
    );
    // Coalesced into the cycle already requested for /d.
    assert_eq!(f.engine.triggers(), triggers);
}

#[test]
fn test_dispose_keeps_recent_activity() {
    let f = fixture(&["a.md"]);
    build(&f, "/a");

    let disposed = f.scheduler.dispose_inactive(Instant::now() + Duration::from_secs(30));
    assert!(disposed.is_empty());
    assert_eq!(f.scheduler.entry_count(), 1);
}

#[test]
fn test_dispose_triggers_a_pass() {
    let f = fixture(&["a.md"]);
    build(&f, "/a");
    let triggers = f.engine.triggers();

    f.scheduler.dispose_inactive(Instant::now() + Duration::from_secs(120));
    assert_eq!(f.scheduler.entry_count(), 0);
    assert_eq!(f.engine.triggers(), triggers + 1);
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_hard_failures_reload_once() {
    let (gate_tx, gate_rx): (Sender<()>, Receiver<()>) = channel::bounded(0);
    let engine = FakeEngine {
        gate: Some(gate_rx),
        ..Default::default()
    };
    let f = fixture_with(
        engine,
        Box::new(|e: &anyhow::Error| panic!("unexpected fatal: {e:#}")),
        &["a.md", "b.md"],
    );

    let a = f.scheduler.request_page(&PageId::new("/a")).unwrap();
    let b = f.scheduler.request_page(&PageId::new("/b")).unwrap();

    run_pass(
        &f.scheduler,
        &[],
        vec![missing("pages/a", 0, "pages/a"), missing("pages/b", 0, "pages/b")],
    );

    assert_eq!(a.wait(), Err(OnDemandError::HardFailure(PageId::new("/a"))));
    assert_eq!(b.wait(), Err(OnDemandError::HardFailure(PageId::new("/b"))));
    assert!(f.scheduler.is_reloading());
    assert!(!f.scheduler.is_available());

    // Another failing pass while the reload is still running.
    run_pass(&f.scheduler, &[], vec![missing("pages/a", 0, "pages/a")]);

    gate_tx.send(()).unwrap();
    f.scheduler.wait_stopped();

    assert_eq!(f.engine.reloads(), 1);
    assert!(f.scheduler.is_stopped());
    assert!(!f.scheduler.is_reloading());
}

#[test]
fn test_requests_wait_for_reload() {
    let (gate_tx, gate_rx) = channel::bounded(0);
    let engine = FakeEngine {
        gate: Some(gate_rx),
        ..Default::default()
    };
    let f = fixture_with(
        engine,
        Box::new(|e: &anyhow::Error| panic!("unexpected fatal: {e:#}")),
        &["a.md"],
    );

    let _a = f.scheduler.request_page(&PageId::new("/a")).unwrap();
    run_pass(&f.scheduler, &[], vec![missing("pages/a", 0, "pages/a")]);
    assert!(f.scheduler.is_reloading());

    let scheduler = f.scheduler.clone();
    let blocked = thread::spawn(move || scheduler.ensure_page(&PageId::new("/a")));

    thread::sleep(Duration::from_millis(20));
    assert!(!blocked.is_finished());

    gate_tx.send(()).unwrap();
    assert_eq!(blocked.join().unwrap(), Err(OnDemandError::Stopped));
}

#[test]
fn test_failed_reload_is_fatal() {
    let (fatal_tx, fatal_rx) = channel::bounded(1);
    let engine = FakeEngine {
        fail_reload: true,
        ..Default::default()
    };
    let f = fixture_with(
        engine,
        Box::new(move |e: &anyhow::Error| {
            let _ = fatal_tx.send(format!("{e:#}"));
        }),
        &["a.md"],
    );

    let _a = f.scheduler.request_page(&PageId::new("/a")).unwrap();
    run_pass(&f.scheduler, &[], vec![missing("layout.md", 0, "pages/a")]);

    let message = fatal_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(message, "config no longer parses");
    assert_eq!(f.engine.reloads(), 1);
}

// =============================================================================
// Stop
// =============================================================================

#[test]
fn test_stop_fails_waiters() {
    let f = fixture(&["a.md"]);
    let wait = f.scheduler.request_page(&PageId::new("/a")).unwrap();

    f.scheduler.stop();
    f.scheduler.stop();

    assert_eq!(wait.wait(), Err(OnDemandError::Stopped));
    assert_eq!(
        f.scheduler.ensure_page(&PageId::new("/a")),
        Err(OnDemandError::Stopped)
    );
    assert!(!f.scheduler.is_available());
}

#[test]
fn test_stopped_scheduler_ignores_passes() {
    let f = fixture(&["a.md"]);
    build(&f, "/a");
    f.scheduler.stop();

    let triggers = f.engine.triggers();
    let submitted = run_pass(&f.scheduler, &[], vec![missing("pages/a", 0, "pages/a")]);
    assert!(submitted.is_empty());
    assert!(f.scheduler.dispose_inactive(Instant::now() + Duration::from_secs(120)).is_empty());
    assert_eq!(f.engine.triggers(), triggers);
    assert_eq!(f.engine.reloads(), 0);
}
