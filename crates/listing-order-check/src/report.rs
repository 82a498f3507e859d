//! Human-readable and JSON reports, plus failure screenshots.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use listing_order::{Inversion, ValidationVerdict};
use serde::Serialize;

pub use crate::collect::AnomalyRecord;
use crate::collect::Collection;
use crate::error::CheckError;
use crate::page::ListingPage;

/// Why a screenshot is being taken; becomes the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactContext {
    ValidationFailed,
    RuntimeError,
}

impl ArtifactContext {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactContext::ValidationFailed => "validation_failed",
            ArtifactContext::RuntimeError => "runtime_error",
        }
    }
}

/// `<dir>/<context>_<timestamp>.png`, with a filesystem-safe UTC timestamp.
pub fn artifact_path(dir: &Path, context: ArtifactContext, at: DateTime<Utc>) -> PathBuf {
    let stamp = at.format("%Y%m%dT%H%M%S%.3fZ").to_string().replace('.', "-");
    dir.join(format!("{}_{stamp}.png", context.as_str()))
}

/// Save a screenshot of `page`. Failures are logged and yield `None`.
///
/// The directory is only left behind when a screenshot was written into it.
pub async fn capture_artifact(
    page: &dyn ListingPage,
    dir: &Path,
    context: ArtifactContext,
) -> Option<PathBuf> {
    if !page.supports_screenshots() {
        tracing::debug!("engine cannot capture screenshots; skipping {}", context.as_str());
        return None;
    }
    let existed = tokio::fs::metadata(dir).await.is_ok();
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::warn!("cannot create artifact directory {}: {e}", dir.display());
        return None;
    }
    let path = artifact_path(dir, context, Utc::now());
    match page.screenshot(&path).await {
        Ok(()) => {
            tracing::info!("screenshot saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            tracing::warn!("screenshot capture failed: {e:#}");
            if !existed {
                // Only succeeds while empty.
                let _ = tokio::fs::remove_dir(dir).await;
            }
            None
        }
    }
}

/// Everything a finished run has to say.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub url: String,
    pub reference_now: DateTime<Utc>,
    pub entries_checked: usize,
    pub pages_visited: usize,
    pub verdict: ValidationVerdict,
    pub anomalies: Vec<AnomalyRecord>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl RunReport {
    pub fn new(
        url: &str,
        collection: &Collection,
        verdict: ValidationVerdict,
        artifact: Option<PathBuf>,
        elapsed: Duration,
    ) -> Self {
        Self {
            url: url.to_string(),
            reference_now: collection.reference_now,
            entries_checked: collection.entries.len(),
            pages_visited: collection.pages_visited,
            verdict,
            anomalies: collection.anomalies.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
            artifact,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.sorted
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let verdict = &self.verdict;

        if verdict.sorted {
            let _ = writeln!(
                out,
                "[OK] {} entries from {} are ordered newest first",
                self.entries_checked, self.url
            );
        } else {
            let _ = writeln!(
                out,
                "[!!] {} is NOT ordered newest first: {} inversion(s) in {} entries",
                self.url,
                verdict.inversions.len(),
                self.entries_checked
            );
            for inversion in &verdict.inversions {
                let _ = writeln!(out, "{}", describe_inversion(inversion));
            }
        }
        let _ = writeln!(
            out,
            "     pages: {}, pairs checked: {}, ties: {}",
            self.pages_visited, verdict.pairs_checked, verdict.ties
        );

        if !self.anomalies.is_empty() {
            let _ = writeln!(
                out,
                "[??] {} time label(s) could not be parsed and were treated as now:",
                self.anomalies.len()
            );
            for record in &self.anomalies {
                let _ = writeln!(
                    out,
                    "     #{} {:?}: {}",
                    record.index + 1,
                    record.title,
                    record.anomaly
                );
            }
        }

        if let Some(path) = &self.artifact {
            let _ = writeln!(out, "Screenshot: {}", path.display());
        }
        let _ = writeln!(out, "Elapsed: {}", format_elapsed(self.elapsed_ms));
        out
    }
}

/// One inversion as two indented lines. Positions are 1-based.
pub fn describe_inversion(inversion: &Inversion) -> String {
    let i = inversion.index;
    format!(
        "     #{} {:?} ({}) is {} min newer than\n     #{} {:?} ({})",
        i + 1,
        inversion.current.title,
        inversion.current.label,
        inversion.delta_minutes,
        i,
        inversion.previous.title,
        inversion.previous.label,
    )
}

/// A run that ended in an error instead of a verdict.
#[derive(thiserror::Error, Debug)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: CheckError,
    pub elapsed: Duration,
    pub artifact: Option<PathBuf>,
}

impl RunFailure {
    pub fn render_text(&self) -> String {
        let mut out = format!("[!!] Run failed: {}\n", self.error);
        if let Some(path) = &self.artifact {
            let _ = writeln!(out, "Screenshot: {}", path.display());
        }
        let _ = writeln!(
            out,
            "Elapsed: {}",
            format_elapsed(self.elapsed.as_millis() as u64)
        );
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": true,
            "kind": self.error.kind(),
            "message": self.error.to_string(),
            "artifact": self.artifact,
            "elapsed_ms": self.elapsed.as_millis() as u64,
        })
    }
}

fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}
