//! Page fetcher abstraction.
//!
//! Defines the `Renderer` and `ListingPage` traits that keep the collector
//! independent of the engine behind them: Chromium via chromiumoxide, or a
//! plain HTTP fetch parsed with `scraper`.

pub mod chromium;
pub mod http;

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{CheckConfig, Engine, Selectors};
use crate::error::CheckError;

/// When navigation counts as finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// The DOM has been parsed; subresources may still be loading.
    DomContentLoaded,
    /// The load event fired.
    #[default]
    Load,
    /// Load fired and resource fetching has gone quiet.
    NetworkIdle,
}

impl FromStr for WaitPolicy {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "domcontentloaded" | "dom" => Ok(WaitPolicy::DomContentLoaded),
            "load" => Ok(WaitPolicy::Load),
            "networkidle" | "idle" => Ok(WaitPolicy::NetworkIdle),
            other => Err(CheckError::Config(format!("unknown wait policy {other:?}"))),
        }
    }
}

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Raw text read from one listing item, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub title: Option<String>,
    pub time_label: Option<String>,
}

impl RawRow {
    pub fn new(title: impl Into<String>, time_label: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            time_label: Some(time_label.into()),
        }
    }
}

/// An engine that can open pages.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new page (tab).
    async fn open_page(&self) -> Result<Box<dyn ListingPage>>;
    /// Shut the engine down, releasing the browser process if any.
    async fn shutdown(&mut self) -> Result<()>;
}

/// A single open page showing a listing.
#[async_trait]
pub trait ListingPage: Send + Sync {
    /// Navigate to a URL, waiting per `wait`, bounded by `timeout_ms`.
    async fn goto(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<NavigationResult>;
    /// All items on the current page, in presentation order.
    async fn rows(&self, selectors: &Selectors) -> Result<Vec<RawRow>>;
    /// Absolute URL of the next page of the listing, if the page links one.
    async fn next_page_url(&self, selector: &str) -> Result<Option<String>>;
    /// Whether [`ListingPage::screenshot`] can succeed at all.
    fn supports_screenshots(&self) -> bool {
        true
    }
    /// Save a PNG image of the current page.
    async fn screenshot(&self, path: &Path) -> Result<()>;
    /// Get the current URL.
    async fn current_url(&self) -> Result<String>;
    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Start the engine selected by the configuration.
pub async fn launch(config: &CheckConfig) -> Result<Box<dyn Renderer>> {
    match config.engine {
        Engine::Chromium => {
            let renderer = chromium::ChromiumRenderer::launch(config).await?;
            Ok(Box::new(renderer))
        }
        Engine::Http => Ok(Box::new(http::HttpRenderer::new(config.timeout_ms)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_policy_names() {
        assert_eq!("load".parse::<WaitPolicy>().unwrap(), WaitPolicy::Load);
        assert_eq!(
            "network-idle".parse::<WaitPolicy>().unwrap(),
            WaitPolicy::NetworkIdle
        );
        assert_eq!(
            "DOMContentLoaded".parse::<WaitPolicy>().unwrap(),
            WaitPolicy::DomContentLoaded
        );
        assert!("eventually".parse::<WaitPolicy>().is_err());
    }
}
