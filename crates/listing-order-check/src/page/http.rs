//! HTTP-only pages: fetch with reqwest, read rows with `scraper`.
//!
//! Sees only server-rendered HTML. Good enough for static listings and much
//! cheaper than a browser, but it cannot take screenshots.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::RwLock;
use url::Url;

use super::{ListingPage, NavigationResult, RawRow, Renderer, WaitPolicy};
use crate::config::Selectors;

const USER_AGENT: &str = concat!("listing-order-check/", env!("CARGO_PKG_VERSION"));

/// Creates [`HttpPage`]s sharing one connection pool.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn open_page(&self) -> Result<Box<dyn ListingPage>> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            document: RwLock::new(Document::default()),
        }))
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Document {
    url: Option<Url>,
    body: String,
}

/// The last document fetched over HTTP.
pub struct HttpPage {
    client: reqwest::Client,
    document: RwLock<Document>,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {css:?}: {e}"))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Read every item row from an HTML document.
///
/// The time label is searched inside the first element sibling that follows
/// each item.
pub fn extract_rows(html: &str, selectors: &Selectors) -> Result<Vec<RawRow>> {
    let item_sel = parse_selector(&selectors.item)?;
    let title_sel = parse_selector(&selectors.title)?;
    let label_sel = parse_selector(&selectors.time_label)?;

    let document = Html::parse_document(html);
    let rows = document
        .select(&item_sel)
        .map(|item| {
            let title = item.select(&title_sel).next().map(element_text);
            let time_label = item
                .next_siblings()
                .find_map(ElementRef::wrap)
                .and_then(|meta| meta.select(&label_sel).next())
                .map(element_text);
            RawRow { title, time_label }
        })
        .collect();
    Ok(rows)
}

/// Resolve the `href` of the first element matching `selector` against `base`.
pub fn extract_next_page(html: &str, base: &Url, selector: &str) -> Result<Option<String>> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let href = document
        .select(&sel)
        .next()
        .and_then(|a| a.value().attr("href"));
    match href {
        Some(href) => {
            let next = base
                .join(href)
                .with_context(|| format!("invalid next page link {href:?}"))?;
            Ok(Some(next.to_string()))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl ListingPage for HttpPage {
    async fn goto(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<NavigationResult> {
        let start = Instant::now();
        tracing::debug!(?wait, "http fetch of {url}");

        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {} from {url}", status.as_u16());
        }
        let final_url = resp.url().clone();
        let body = resp.text().await.context("failed to read response body")?;

        *self.document.write().await = Document {
            url: Some(final_url.clone()),
            body,
        };

        Ok(NavigationResult {
            final_url: final_url.to_string(),
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn rows(&self, selectors: &Selectors) -> Result<Vec<RawRow>> {
        let document = self.document.read().await;
        extract_rows(&document.body, selectors)
    }

    async fn next_page_url(&self, selector: &str) -> Result<Option<String>> {
        let document = self.document.read().await;
        let Some(base) = &document.url else {
            return Ok(None);
        };
        extract_next_page(&document.body, base, selector)
    }

    fn supports_screenshots(&self) -> bool {
        false
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        bail!(
            "the http engine cannot capture screenshots ({})",
            path.display()
        )
    }

    async fn current_url(&self) -> Result<String> {
        let document = self.document.read().await;
        Ok(document.url.as_ref().map(Url::to_string).unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
