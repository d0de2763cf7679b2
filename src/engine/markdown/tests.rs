//! End-to-end tests: real engine worker, real scheduler, pages on disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::config::test_config_at;
use crate::core::PageId;
use crate::ondemand::{EntryStatus, OnDemandError, Scheduler, SchedulerOptions};
use crate::page::FsPageResolver;

const WAIT: Duration = Duration::from_secs(10);

struct Site {
    dir: TempDir,
    engine: Arc<MarkdownEngine>,
    scheduler: Arc<Scheduler>,
}

impl Site {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            write(&dir.path().join("pages").join(rel), content);
        }

        let config = Arc::new(test_config_at(dir.path(), ""));
        let engine = MarkdownEngine::start(Arc::clone(&config)).unwrap();
        let resolver = Arc::new(FsPageResolver::from_config(&config));
        let options = SchedulerOptions {
            dispose_interval: Duration::from_secs(3600),
            ..SchedulerOptions::default()
        };
        let scheduler = Scheduler::start_with(
            engine.clone(),
            resolver,
            options,
            Box::new(|e: &anyhow::Error| panic!("unexpected fatal: {e:#}")),
        );
        Self {
            dir,
            engine,
            scheduler,
        }
    }

    fn page(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join("pages").join(rel)
    }

    fn ensure(&self, page: &str) -> Result<(), OnDemandError> {
        self.scheduler
            .request_page(&PageId::new(page))?
            .wait_timeout(WAIT)
    }

    fn artifact(&self, unit: &str) -> String {
        fs::read_to_string(self.engine.artifact_path(unit)).unwrap()
    }
}

impl Drop for Site {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.engine.shutdown();
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_builds_requested_page() {
    let site = Site::new(&[("blog.md", "# Blog\n\nHello *world*"), ("about.md", "# About")]);

    site.ensure("/blog").unwrap();

    let html = site.artifact("pages/blog");
    assert!(html.contains("<h1>Blog</h1>"));
    assert!(html.contains("<em>world</em>"));
    assert!(html.contains("<title>/blog</title>"));
    assert_eq!(
        site.scheduler.entry_status(&PageId::new("/blog")),
        Some(EntryStatus::Built)
    );
    // Never requested, never built.
    assert!(!site.engine.artifact_path("pages/about").exists());
}

#[test]
fn test_builds_root_and_nested_pages() {
    let site = Site::new(&[("index.md", "# Home"), ("docs/intro/index.md", "# Intro")]);

    site.ensure("/").unwrap();
    site.ensure("/docs/intro/").unwrap();

    assert!(site.artifact("pages/index").contains("<h1>Home</h1>"));
    assert!(site.artifact("pages/docs/intro").contains("<h1>Intro</h1>"));
    assert_eq!(site.scheduler.entry_count(), 2);
}

#[test]
fn test_expands_includes() {
    let site = Site::new(&[
        ("guide.md", "# Guide\n\n{{ include \"partials/note.md\" }}"),
        ("partials/note.md", "> note"),
    ]);

    site.ensure("/guide").unwrap();
    assert!(site.artifact("pages/guide").contains("<blockquote>"));
}

#[test]
fn test_missing_include_is_retried_after_fix() {
    let site = Site::new(&[("guide.md", "{{ include \"partials/nav.md\" }}")]);
    let page = PageId::new("/guide");

    let wait = site.scheduler.request_page(&page).unwrap();
    assert_eq!(
        wait.wait_timeout(Duration::from_millis(500)),
        Err(OnDemandError::Timeout(page.clone()))
    );
    let error = site.scheduler.last_error(&page).unwrap();
    assert!(error.starts_with("partials/nav.md"));
    assert!(!site.scheduler.is_reloading());

    write(&site.page("partials/nav.md"), "[home](/)");
    let wait = site.scheduler.request_page(&page).unwrap();
    site.scheduler.invalidate();
    wait.wait_timeout(WAIT).unwrap();
    assert!(site.artifact("pages/guide").contains("href=\"/\""));
}

#[test]
fn test_missing_include_inside_pages_dir_does_not_reload() {
    let site = Site::new(&[("blog.md", "# Blog\n\n{{ include \"pages/nav.md\" }}")]);
    let page = PageId::new("/blog");

    let wait = site.scheduler.request_page(&page).unwrap();
    assert_eq!(
        wait.wait_timeout(Duration::from_millis(500)),
        Err(OnDemandError::Timeout(page.clone()))
    );
    assert!(!site.scheduler.is_reloading());
    assert!(site.scheduler.is_available());
    assert!(site.scheduler.last_error(&page).unwrap().starts_with("pages/nav.md"));

    write(&site.page("pages/nav.md"), "nav");
    let wait = site.scheduler.request_page(&page).unwrap();
    site.scheduler.invalidate();
    wait.wait_timeout(WAIT).unwrap();
    assert!(site.artifact("pages/blog").contains("nav"));
}

#[test]
fn test_edit_rebuilds_on_next_pass() {
    let site = Site::new(&[("a.md", "# One")]);
    site.ensure("/a").unwrap();
    assert!(site.artifact("pages/a").contains("One"));

    let path = site.page("a.md");
    fs::write(&path, "# Two").unwrap();
    // Ensure the mtime moves even on coarse filesystems.
    fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(std::time::SystemTime::now() + Duration::from_secs(5))
        .unwrap();

    let before = site.engine.artifact_path("pages/a");
    site.scheduler.invalidate();
    let deadline = std::time::Instant::now() + WAIT;
    while !fs::read_to_string(&before).unwrap().contains("Two") {
        assert!(std::time::Instant::now() < deadline, "page was not rebuilt");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_unknown_page() {
    let site = Site::new(&[]);
    assert_eq!(
        site.ensure("/nope"),
        Err(OnDemandError::PageNotFound(PageId::new("/nope")))
    );
}

#[test]
fn test_full_reload_picks_up_config() {
    let site = Site::new(&[("a.md", "# A")]);
    fs::write(
        site.dir.path().join("ondemand.toml"),
        "[on_demand]\npages_buffer_length = 9\n",
    )
    .unwrap();

    site.engine.full_reload().unwrap();
    assert_eq!(site.engine.config().on_demand.pages_buffer_length, 9);
}

#[test]
fn test_full_reload_fails_without_pages_root() {
    let site = Site::new(&[("a.md", "# A")]);
    fs::remove_dir_all(site.dir.path().join("pages")).unwrap();
    assert!(site.engine.full_reload().is_err());
}

#[test]
fn test_render_escapes_title() {
    let html = render("<x>", "text");
    assert!(html.contains("<title>&lt;x&gt;</title>"));
    assert!(html.contains("<p>text</p>"));
}
