//! Listing collection: walk the listing pages and build parsed entries.
//!
//! All labels of a run are parsed against one reference instant held by the
//! [`LabelParser`] passed in, never against a fresh clock reading per row.

use chrono::{DateTime, Utc};
use listing_order::{Anomaly, LabelParser, ListingEntry, TimeLabel};
use serde::Serialize;

use crate::config::CheckConfig;
use crate::error::{CheckError, CheckResult, RowField};
use crate::page::{ListingPage, NavigationResult, RawRow};
use crate::retry::retry_with_backoff;

/// A label that could not be parsed, with where it appeared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub index: usize,
    pub title: String,
    pub anomaly: Anomaly,
}

/// Entries collected in one run, in presentation order.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub entries: Vec<ListingEntry>,
    /// Entries whose label degraded to the reference instant.
    pub anomalies: Vec<AnomalyRecord>,
    pub pages_visited: usize,
    pub reference_now: DateTime<Utc>,
}

impl Collection {
    pub fn new(
        entries: Vec<ListingEntry>,
        pages_visited: usize,
        reference_now: DateTime<Utc>,
    ) -> Self {
        let anomalies = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry.parsed.anomaly.as_ref().map(|anomaly| AnomalyRecord {
                    index,
                    title: entry.title.clone(),
                    anomaly: anomaly.clone(),
                })
            })
            .collect();
        Self {
            entries,
            anomalies,
            pages_visited,
            reference_now,
        }
    }
}

/// Navigate with retry and exponential backoff.
pub async fn navigate(
    page: &dyn ListingPage,
    url: &str,
    config: &CheckConfig,
) -> CheckResult<NavigationResult> {
    let timeout_ms = config.timeout_ms;
    let wait = config.wait_policy;
    let nav = retry_with_backoff(config.retry_policy(), "navigation", move |attempt| {
        tracing::debug!(?wait, "navigating to {url} (attempt {attempt})");
        page.goto(url, wait, timeout_ms)
    })
    .await
    .map_err(|e| CheckError::Navigation {
        url: url.to_string(),
        attempts: e.attempts,
        source: e.last,
    })?;

    tracing::info!("loaded {} in {}ms", nav.final_url, nav.load_time_ms);
    Ok(nav)
}

/// Turn one raw row into an entry. `index` is the row's position in the run.
pub fn entry_from_row(
    index: usize,
    row: RawRow,
    parser: &LabelParser,
) -> CheckResult<ListingEntry> {
    let title = row
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or(CheckError::Extraction {
            index,
            field: RowField::Title,
        })?;
    let label = row
        .time_label
        .map(TimeLabel::new)
        .ok_or(CheckError::Extraction {
            index,
            field: RowField::TimeLabel,
        })?;

    let parsed = parser.parse(&label);
    tracing::debug!(index, %label, instant = %parsed.instant, "{title}");
    Ok(ListingEntry::new(title, label, parsed))
}

/// Collect up to `config.item_limit` entries starting at `config.url`.
///
/// Follows the next-page link while more entries are needed and the page
/// budget allows. A row without a title or time label aborts the run.
pub async fn collect(
    page: &dyn ListingPage,
    config: &CheckConfig,
    parser: &LabelParser,
) -> CheckResult<Collection> {
    let limit = config.item_limit;
    let mut entries = Vec::with_capacity(limit);
    let mut url = config.url.clone();
    let mut pages_visited = 0;

    loop {
        navigate(page, &url, config).await?;
        pages_visited += 1;

        let rows = page
            .rows(&config.selectors)
            .await
            .map_err(CheckError::Page)?;
        tracing::info!("page {pages_visited}: {} item(s)", rows.len());
        if rows.is_empty() {
            tracing::warn!("no items matched {:?} on {url}", config.selectors.item);
        }

        for row in rows.into_iter().take(limit - entries.len()) {
            let entry = entry_from_row(entries.len(), row, parser)?;
            entries.push(entry);
        }

        if entries.len() >= limit || pages_visited >= config.page_budget() {
            break;
        }
        match page
            .next_page_url(&config.selectors.next_page)
            .await
            .map_err(CheckError::Page)?
        {
            Some(next) => url = next,
            None => break,
        }
    }

    if entries.len() < limit {
        tracing::warn!(
            "collected {} of {limit} requested item(s) across {pages_visited} page(s)",
            entries.len()
        );
    }

    Ok(Collection::new(entries, pages_visited, parser.now()))
}
