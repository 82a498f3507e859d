//! Chromium-based pages using chromiumoxide.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport as BrowserViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use super::{ListingPage, NavigationResult, RawRow, Renderer, WaitPolicy};
use crate::config::{CheckConfig, Selectors};

/// Interval between resource-count samples while waiting for network idle.
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. LISTING_CHECK_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("LISTING_CHECK_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Chrome for Testing under the home directory
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".cache/chrome/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![
                home.join(".cache/chrome/chrome-linux64/chrome"),
                home.join(".local/bin/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium browser session.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch Chromium with the configured head mode and viewport.
    pub async fn launch(config: &CheckConfig) -> Result<Self> {
        let chrome_path = match &config.chromium_path {
            Some(path) => path.clone(),
            None => find_chromium()
                .context("Chromium not found. Set LISTING_CHECK_CHROMIUM_PATH or use --engine http.")?,
        };

        let viewport = BrowserViewport {
            width: config.viewport.width,
            height: config.viewport.height,
            ..BrowserViewport::default()
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(config.viewport.width, config.viewport.height)
            .viewport(viewport)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler: {e}");
                }
            }
        });

        tracing::info!(
            headless = config.headless,
            viewport = %config.viewport,
            "Chromium launched"
        );

        Ok(Self { browser, handler })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open_page(&self) -> Result<Box<dyn ListingPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn shutdown(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.context("failed to close Chromium")?;
        tracing::debug!("Chromium closed");
        Ok(())
    }
}

/// A single Chromium tab.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    /// Wait until the number of loaded resources stops changing.
    async fn wait_for_network_idle(&self, deadline: Instant) -> Result<()> {
        let mut last: i64 = -1;
        while Instant::now() < deadline {
            let count: i64 = self
                .eval("performance.getEntriesByType('resource').length")
                .await?;
            if count == last {
                return Ok(());
            }
            last = count;
            tokio::time::sleep(IDLE_POLL).await;
        }
        tracing::debug!("network did not go idle before the navigation deadline");
        Ok(())
    }
}

/// Script returning `[{title, time_label}]` for every item on the page.
pub fn rows_script(selectors: &Selectors) -> Result<String> {
    let item = serde_json::to_string(&selectors.item)?;
    let title = serde_json::to_string(&selectors.title)?;
    let time_label = serde_json::to_string(&selectors.time_label)?;
    Ok(format!(
        r#"(() => {{
  const text = (el) => (el ? el.textContent.trim() : null);
  return Array.from(document.querySelectorAll({item})).map((item) => {{
    const meta = item.nextElementSibling;
    return {{
      title: text(item.querySelector({title})),
      time_label: text(meta ? meta.querySelector({time_label}) : null),
    }};
  }});
}})()"#
    ))
}

#[async_trait]
impl ListingPage for ChromiumPage {
    async fn goto(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<NavigationResult> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }

        if wait != WaitPolicy::DomContentLoaded {
            let remaining = timeout.saturating_sub(start.elapsed());
            if tokio::time::timeout(remaining, self.page.wait_for_navigation())
                .await
                .is_err()
            {
                bail!("page load timed out after {timeout_ms}ms");
            }
        }
        if wait == WaitPolicy::NetworkIdle {
            self.wait_for_network_idle(start + timeout).await?;
        }

        let final_url = self.current_url().await.unwrap_or_else(|_| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn rows(&self, selectors: &Selectors) -> Result<Vec<RawRow>> {
        let script = rows_script(selectors)?;
        self.eval(&script).await.context("failed to read listing rows")
    }

    async fn next_page_url(&self, selector: &str) -> Result<Option<String>> {
        let selector = serde_json::to_string(selector)?;
        self.eval(&format!(
            "(() => {{ const a = document.querySelector({selector}); return a && a.href ? a.href : null; }})()"
        ))
        .await
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .with_context(|| format!("failed to save screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}
