//! Configuration loading and resolution.
//!
//! Values resolve from built-in defaults, then `LISTING_CHECK_*` environment
//! variables, then command line flags ([`ConfigOverrides`]).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use listing_order::ScanMode;
use serde::{Deserialize, Serialize};

use crate::error::{CheckError, CheckResult};
use crate::page::WaitPolicy;
use crate::retry::RetryPolicy;

pub const DEFAULT_URL: &str = "https://news.ycombinator.com/newest";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_ITEM_LIMIT: usize = 100;
pub const DEFAULT_ARTIFACT_DIR: &str = "screenshots";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_PAGES: usize = 10;

const ENV_PREFIX: &str = "LISTING_CHECK_";

/// Browser window size used for rendering and screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl FromStr for Viewport {
    type Err = CheckError;

    /// Parse `WIDTHxHEIGHT`, e.g. `1920x1080`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CheckError::Config(format!("viewport must look like 1280x720, got {s:?}"));
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width = w.trim().parse().map_err(|_| invalid())?;
        let height = h.trim().parse().map_err(|_| invalid())?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which page fetcher drives the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Headless (or headed) Chromium via the DevTools protocol.
    #[default]
    Chromium,
    /// Plain HTTP fetch and static HTML parsing; no screenshots.
    Http,
}

impl FromStr for Engine {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chromium" | "chrome" | "browser" => Ok(Engine::Chromium),
            "http" => Ok(Engine::Http),
            other => Err(CheckError::Config(format!("unknown engine {other:?}"))),
        }
    }
}

/// CSS selectors describing the listing's structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    /// One element per listing item.
    pub item: String,
    /// Title element, looked up inside the item.
    pub title: String,
    /// Time label element, looked up inside the item's next element sibling.
    pub time_label: String,
    /// Pagination link to the next page of the listing.
    pub next_page: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            item: "tr.athing".to_string(),
            title: ".titleline > a".to_string(),
            time_label: ".age".to_string(),
            next_page: "a.morelink".to_string(),
        }
    }
}

/// Complete configuration for one check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub url: String,
    pub headless: bool,
    /// Total navigation attempts, including the first.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub item_limit: usize,
    pub artifact_dir: PathBuf,
    pub viewport: Viewport,
    pub timeout_ms: u64,
    /// When a navigation counts as loaded.
    pub wait_policy: WaitPolicy,
    pub engine: Engine,
    pub selectors: Selectors,
    pub follow_pages: bool,
    pub max_pages: usize,
    pub scan_mode: ScanMode,
    /// Explicit Chromium binary; otherwise discovered.
    pub chromium_path: Option<PathBuf>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            headless: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_DELAY_MS,
            item_limit: DEFAULT_ITEM_LIMIT,
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            viewport: Viewport::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            wait_policy: WaitPolicy::default(),
            engine: Engine::default(),
            selectors: Selectors::default(),
            follow_pages: true,
            max_pages: DEFAULT_MAX_PAGES,
            scan_mode: ScanMode::default(),
            chromium_path: None,
        }
    }
}

impl CheckConfig {
    /// Defaults overlaid with `LISTING_CHECK_*` environment variables.
    pub fn from_env() -> CheckResult<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay variables read through `lookup`, keyed by full variable name.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> CheckResult<Self> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(url) = get("URL") {
            self.url = url;
        }
        if let Some(v) = get("HEADLESS") {
            self.headless = parse_bool("HEADLESS", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_DELAY_MS") {
            self.retry_base_delay_ms = parse_number("RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("LIMIT") {
            self.item_limit = parse_number("LIMIT", &v)?;
        }
        if let Some(v) = get("ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = get("VIEWPORT") {
            self.viewport = v.parse()?;
        }
        if let Some(v) = get("ENGINE") {
            self.engine = v.parse()?;
        }
        if let Some(v) = get("WAIT") {
            self.wait_policy = v.parse()?;
        }
        if let Some(v) = get("CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// Apply explicit overrides on top of whatever is already resolved.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> CheckResult<Self> {
        let o = overrides;
        if let Some(url) = &o.url {
            self.url = url.clone();
        }
        if let Some(headless) = o.headless {
            self.headless = headless;
        }
        if let Some(n) = o.max_retries {
            self.max_retries = n;
        }
        if let Some(ms) = o.retry_base_delay_ms {
            self.retry_base_delay_ms = ms;
        }
        if let Some(n) = o.item_limit {
            self.item_limit = n;
        }
        if let Some(dir) = &o.artifact_dir {
            self.artifact_dir = dir.clone();
        }
        if let Some(v) = &o.viewport {
            self.viewport = v.parse()?;
        }
        if let Some(ms) = o.timeout_ms {
            self.timeout_ms = ms;
        }
        if let Some(wait) = o.wait_policy {
            self.wait_policy = wait;
        }
        if let Some(engine) = o.engine {
            self.engine = engine;
        }
        if let Some(follow) = o.follow_pages {
            self.follow_pages = follow;
        }
        if let Some(n) = o.max_pages {
            self.max_pages = n;
        }
        if let Some(mode) = o.scan_mode {
            self.scan_mode = mode;
        }
        if let Some(s) = &o.item_selector {
            self.selectors.item = s.clone();
        }
        if let Some(s) = &o.title_selector {
            self.selectors.title = s.clone();
        }
        if let Some(s) = &o.time_label_selector {
            self.selectors.time_label = s.clone();
        }
        if let Some(s) = &o.next_page_selector {
            self.selectors.next_page = s.clone();
        }
        Ok(self)
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> CheckResult<()> {
        url::Url::parse(&self.url)
            .map_err(|e| CheckError::Config(format!("invalid url {:?}: {e}", self.url)))?;
        if self.max_retries == 0 {
            return Err(CheckError::Config("max retries must be at least 1".into()));
        }
        if self.item_limit == 0 {
            return Err(CheckError::Config("item limit must be at least 1".into()));
        }
        if self.max_pages == 0 {
            return Err(CheckError::Config("max pages must be at least 1".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(CheckError::Config(format!(
                "viewport {} has a zero dimension",
                self.viewport
            )));
        }
        if self.selectors.item.trim().is_empty() {
            return Err(CheckError::Config("item selector is empty".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// Pages the collector may visit.
    pub fn page_budget(&self) -> usize {
        if self.follow_pages {
            self.max_pages
        } else {
            1
        }
    }
}

/// Explicitly requested settings, typically from command line flags.
///
/// `None` leaves the underlying value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub headless: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub item_limit: Option<usize>,
    pub artifact_dir: Option<PathBuf>,
    /// `WIDTHxHEIGHT`, parsed when applied.
    pub viewport: Option<String>,
    pub timeout_ms: Option<u64>,
    pub wait_policy: Option<WaitPolicy>,
    pub engine: Option<Engine>,
    pub follow_pages: Option<bool>,
    pub max_pages: Option<usize>,
    pub scan_mode: Option<ScanMode>,
    pub item_selector: Option<String>,
    pub title_selector: Option<String>,
    pub time_label_selector: Option<String>,
    pub next_page_selector: Option<String>,
}

fn parse_bool(name: &str, value: &str) -> CheckResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CheckError::Config(format!(
            "{ENV_PREFIX}{name} must be a boolean, got {other:?}"
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> CheckResult<T> {
    value.trim().parse().map_err(|_| {
        CheckError::Config(format!(
            "{ENV_PREFIX}{name} must be a non-negative integer, got {value:?}"
        ))
    })
}
