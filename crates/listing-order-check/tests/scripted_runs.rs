//! Full runs against a scripted in-memory listing.
//!
//! Covers pagination, retry, fatal extraction, screenshot capture and
//! page cleanup without launching a browser.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use listing_order::{LabelParser, ScanMode};
use tempfile::TempDir;

use listing_order_check::collect::collect;
use listing_order_check::config::{CheckConfig, Selectors};
use listing_order_check::page::{ListingPage, NavigationResult, RawRow, Renderer, WaitPolicy};
use listing_order_check::runner::{check_page, run_with_renderer};
use listing_order_check::{CheckError, RowField};

// ─────────────────────── fixture ───────────────────────

const FIRST: &str = "https://list.example/newest";
const SECOND: &str = "https://list.example/newest?p=2";
const THIRD: &str = "https://list.example/newest?p=3";

#[derive(Clone, Default)]
struct Listing {
    rows: Vec<RawRow>,
    next: Option<String>,
}

#[derive(Default)]
struct ScriptedPage {
    listings: HashMap<String, Listing>,
    /// Remaining failures before navigation to a URL succeeds.
    flaky: Mutex<HashMap<String, u32>>,
    current: Mutex<Option<String>>,
    gotos: AtomicU32,
    waits: Mutex<Vec<WaitPolicy>>,
    camera_broken: bool,
    closed: Arc<AtomicBool>,
}

impl ScriptedPage {
    fn new() -> Self {
        Self::default()
    }

    fn listing(mut self, url: &str, rows: Vec<RawRow>, next: Option<&str>) -> Self {
        self.listings.insert(
            url.to_string(),
            Listing {
                rows,
                next: next.map(str::to_string),
            },
        );
        self
    }

    fn flaky(self, url: &str, failures: u32) -> Self {
        self.flaky.lock().unwrap().insert(url.to_string(), failures);
        self
    }

    fn broken_camera(mut self) -> Self {
        self.camera_broken = true;
        self
    }

    fn current_listing(&self) -> anyhow::Result<Listing> {
        let current = self.current.lock().unwrap().clone();
        let url = current.ok_or_else(|| anyhow::anyhow!("no page loaded"))?;
        Ok(self.listings.get(&url).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ListingPage for ScriptedPage {
    async fn goto(
        &self,
        url: &str,
        wait: WaitPolicy,
        _timeout_ms: u64,
    ) -> anyhow::Result<NavigationResult> {
        self.gotos.fetch_add(1, Ordering::SeqCst);
        self.waits.lock().unwrap().push(wait);
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(left) = flaky.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    anyhow::bail!("net::ERR_CONNECTION_RESET at {url}");
                }
            }
        }
        if !self.listings.contains_key(url) {
            anyhow::bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn rows(&self, _selectors: &Selectors) -> anyhow::Result<Vec<RawRow>> {
        Ok(self.current_listing()?.rows)
    }

    async fn next_page_url(&self, _selector: &str) -> anyhow::Result<Option<String>> {
        Ok(self.current_listing()?.next)
    }

    async fn screenshot(&self, path: &Path) -> anyhow::Result<()> {
        if self.camera_broken {
            anyhow::bail!("Page.captureScreenshot: target crashed");
        }
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.current.lock().unwrap().clone().unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one prepared page.
struct ScriptedRenderer {
    page: Mutex<Option<ScriptedPage>>,
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn open_page(&self) -> anyhow::Result<Box<dyn ListingPage>> {
        let page = self
            .page
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("page already opened"))?;
        Ok(Box::new(page))
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ─────────────────────── helpers ───────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 20, 8, 0, 0).unwrap()
}

fn rows(specs: &[(&str, &str)]) -> Vec<RawRow> {
    specs
        .iter()
        .map(|(title, label)| RawRow::new(*title, *label))
        .collect()
}

fn config(artifacts: &TempDir) -> CheckConfig {
    CheckConfig {
        url: FIRST.to_string(),
        retry_base_delay_ms: 1,
        artifact_dir: artifacts.path().join("shots"),
        ..CheckConfig::default()
    }
}

fn screenshots(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn two_sorted_pages() -> ScriptedPage {
    ScriptedPage::new()
        .listing(
            FIRST,
            rows(&[
                ("Alpha", "1 minute ago"),
                ("Beta", "1 minute ago"),
                ("Gamma", "4 minutes ago"),
            ]),
            Some(SECOND),
        )
        .listing(
            SECOND,
            rows(&[
                ("Delta", "9 minutes ago"),
                ("Epsilon", "2 hours ago"),
                ("Zeta", "1 day ago"),
            ]),
            Some(THIRD),
        )
        .listing(THIRD, rows(&[("Eta", "3 days ago")]), None)
}

// ─────────────────────── collection ───────────────────────

#[tokio::test]
async fn collects_across_pages_up_to_the_limit() {
    let dir = TempDir::new().unwrap();
    let page = two_sorted_pages();
    let config = CheckConfig {
        item_limit: 5,
        ..config(&dir)
    };

    let collection = collect(&page, &config, &LabelParser::new(now()))
        .await
        .unwrap();

    let titles: Vec<&str> = collection.entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha", "Beta", "Gamma", "Delta", "Epsilon"]);
    assert_eq!(collection.pages_visited, 2);
    assert_eq!(collection.reference_now, now());
    assert_eq!(
        collection.entries[4].instant(),
        now() - TimeDelta::hours(2)
    );
}

#[tokio::test]
async fn stops_when_no_next_page() {
    let dir = TempDir::new().unwrap();
    let page = two_sorted_pages();

    let collection = collect(&page, &config(&dir), &LabelParser::new(now()))
        .await
        .unwrap();

    assert_eq!(collection.entries.len(), 7);
    assert_eq!(collection.pages_visited, 3);
}

#[tokio::test]
async fn no_paginate_reads_only_the_first_page() {
    let dir = TempDir::new().unwrap();
    let page = two_sorted_pages();
    let config = CheckConfig {
        follow_pages: false,
        ..config(&dir)
    };

    let collection = collect(&page, &config, &LabelParser::new(now()))
        .await
        .unwrap();

    assert_eq!(collection.entries.len(), 3);
    assert_eq!(collection.pages_visited, 1);
}

#[tokio::test]
async fn transient_navigation_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let page = two_sorted_pages().flaky(FIRST, 2);

    let collection = collect(&page, &config(&dir), &LabelParser::new(now()))
        .await
        .unwrap();

    assert_eq!(collection.entries.len(), 7);
    // 2 failures + 1 success on the first page, then one goto per further page
    assert_eq!(page.gotos.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn navigation_waits_per_configured_policy() {
    let dir = TempDir::new().unwrap();
    let page = two_sorted_pages().flaky(FIRST, 1);
    let config = CheckConfig {
        wait_policy: WaitPolicy::NetworkIdle,
        ..config(&dir)
    };

    collect(&page, &config, &LabelParser::new(now()))
        .await
        .unwrap();

    let waits = page.waits.lock().unwrap().clone();
    assert_eq!(waits.len(), 4);
    assert!(waits.iter().all(|w| *w == WaitPolicy::NetworkIdle));
}

#[tokio::test]
async fn missing_time_label_aborts_collection() {
    let dir = TempDir::new().unwrap();
    let page = ScriptedPage::new().listing(
        FIRST,
        vec![
            RawRow::new("Alpha", "1 minute ago"),
            RawRow {
                title: Some("Beta".into()),
                time_label: None,
            },
        ],
        None,
    );

    let err = collect(&page, &config(&dir), &LabelParser::new(now()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckError::Extraction {
            index: 1,
            field: RowField::TimeLabel
        }
    ));
}

// ─────────────────────── full runs ───────────────────────

#[tokio::test]
async fn sorted_listing_passes_without_screenshot() {
    let dir = TempDir::new().unwrap();
    let page = two_sorted_pages();
    let config = config(&dir);

    let report = check_page(&page, &config, &LabelParser::new(now()), Instant::now())
        .await
        .unwrap();

    assert!(report.passed());
    assert_eq!(report.entries_checked, 7);
    assert_eq!(report.verdict.ties, 1);
    assert!(report.artifact.is_none());
    assert!(screenshots(&config.artifact_dir).is_empty());
}

#[tokio::test]
async fn inversion_fails_validation_and_captures_screenshot() {
    let dir = TempDir::new().unwrap();
    let page = ScriptedPage::new().listing(
        FIRST,
        rows(&[
            ("Older", "5 minutes ago"),
            ("Newer", "2 minutes ago"),
            ("Oldest", "1 hour ago"),
        ]),
        None,
    );
    let config = config(&dir);

    let report = check_page(&page, &config, &LabelParser::new(now()), Instant::now())
        .await
        .unwrap();

    assert!(!report.passed());
    let inversion = report.verdict.first_inversion().unwrap();
    assert_eq!(inversion.index, 1);
    assert_eq!(inversion.previous.title, "Older");
    assert_eq!(inversion.current.title, "Newer");
    assert_eq!(inversion.delta_minutes, 3);

    let artifact = report.artifact.as_ref().unwrap();
    assert!(artifact.exists());
    let shots = screenshots(&config.artifact_dir);
    assert_eq!(shots.len(), 1);
    assert!(shots[0].starts_with("validation_failed_"));
    assert!(shots[0].ends_with(".png"));
}

#[tokio::test]
async fn exhaustive_mode_reports_every_inversion() {
    let dir = TempDir::new().unwrap();
    let page = ScriptedPage::new().listing(
        FIRST,
        rows(&[
            ("A", "5 minutes ago"),
            ("B", "2 minutes ago"),
            ("C", "30 minutes ago"),
            ("D", "10 minutes ago"),
        ]),
        None,
    );
    let config = CheckConfig {
        scan_mode: ScanMode::Exhaustive,
        ..config(&dir)
    };

    let report = check_page(&page, &config, &LabelParser::new(now()), Instant::now())
        .await
        .unwrap();

    let indices: Vec<usize> = report.verdict.inversions.iter().map(|i| i.index).collect();
    assert_eq!(indices, vec![1, 3]);
}

#[tokio::test]
async fn exhausted_navigation_is_a_runtime_failure() {
    let dir = TempDir::new().unwrap();
    let page = two_sorted_pages().flaky(FIRST, 10);
    let config = config(&dir);

    let failure = check_page(&page, &config, &LabelParser::new(now()), Instant::now())
        .await
        .unwrap_err();

    match &failure.error {
        CheckError::Navigation { url, attempts, .. } => {
            assert_eq!(url, FIRST);
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected navigation error, got {other:?}"),
    }
    assert_eq!(page.gotos.load(Ordering::SeqCst), 3);

    let shots = screenshots(&config.artifact_dir);
    assert_eq!(shots.len(), 1);
    assert!(shots[0].starts_with("runtime_error_"));
    assert!(failure.artifact.is_some());
}

#[tokio::test]
async fn failed_capture_leaves_no_artifact_dir() {
    let dir = TempDir::new().unwrap();
    let page = ScriptedPage::new()
        .listing(
            FIRST,
            rows(&[("Older", "5 minutes ago"), ("Newer", "2 minutes ago")]),
            None,
        )
        .broken_camera();
    let config = config(&dir);

    let report = check_page(&page, &config, &LabelParser::new(now()), Instant::now())
        .await
        .unwrap();

    assert!(!report.passed());
    assert!(report.artifact.is_none());
    assert!(!config.artifact_dir.exists());
}

#[tokio::test]
async fn anomalies_are_reported_but_not_fatal() {
    let dir = TempDir::new().unwrap();
    let page = ScriptedPage::new().listing(
        FIRST,
        rows(&[("Fresh", "just now"), ("Later", "3 minutes ago")]),
        None,
    );

    let report = check_page(&page, &config(&dir), &LabelParser::new(now()), Instant::now())
        .await
        .unwrap();

    assert!(report.passed());
    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].title, "Fresh");
    assert_eq!(report.anomalies[0].index, 0);
}

#[tokio::test]
async fn page_is_closed_on_success_and_on_failure() {
    let dir = TempDir::new().unwrap();

    let ok_page = two_sorted_pages();
    let ok_closed = Arc::clone(&ok_page.closed);
    let renderer = ScriptedRenderer {
        page: Mutex::new(Some(ok_page)),
    };
    let report = run_with_renderer(&renderer, &config(&dir), Instant::now()).await;
    assert!(report.is_ok());
    assert!(ok_closed.load(Ordering::SeqCst));

    let bad_page = ScriptedPage::new().listing(
        FIRST,
        vec![RawRow {
            title: None,
            time_label: Some("1 minute ago".into()),
        }],
        None,
    );
    let bad_closed = Arc::clone(&bad_page.closed);
    let renderer = ScriptedRenderer {
        page: Mutex::new(Some(bad_page)),
    };
    let failure = run_with_renderer(&renderer, &config(&dir), Instant::now())
        .await
        .unwrap_err();
    assert!(matches!(failure.error, CheckError::Extraction { .. }));
    assert!(bad_closed.load(Ordering::SeqCst));
}
