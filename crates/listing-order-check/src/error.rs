//! Error types for a listing check run.

use std::path::PathBuf;

/// Which field of a listing row could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    Title,
    TimeLabel,
}

impl std::fmt::Display for RowField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowField::Title => f.write_str("title"),
            RowField::TimeLabel => f.write_str("time label"),
        }
    }
}

/// All errors that abort a check run.
///
/// A listing that turns out to be unsorted is not an error; it is reported
/// through the verdict.
#[derive(thiserror::Error, Debug)]
pub enum CheckError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Navigation to {url} failed after {attempts} attempt(s): {source:#}")]
    Navigation {
        url: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Row {index} has no {field}")]
    Extraction { index: usize, field: RowField },

    #[error("Page error: {0:#}")]
    Page(#[source] anyhow::Error),

    #[error("Artifact error at {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheckError {
    /// Short machine-readable kind, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::Config(_) => "config",
            CheckError::Navigation { .. } => "navigation",
            CheckError::Extraction { .. } => "extraction",
            CheckError::Page(_) => "page",
            CheckError::Artifact { .. } => "artifact",
            CheckError::Io(_) => "io",
            CheckError::Json(_) => "json",
        }
    }
}

pub type CheckResult<T> = Result<T, CheckError>;
