//! Core data types for listing entries and ordering verdicts.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A relative time label exactly as the listing displays it ("12 minutes ago").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeLabel(String);

impl TimeLabel {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TimeLabel {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for TimeLabel {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Why a label could not be converted and degraded to the reference instant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    #[error("no `<number> <unit>` pattern in {raw:?}")]
    NoMatch { raw: String },

    #[error("unknown time unit {unit:?} in {raw:?}")]
    UnknownUnit { raw: String, unit: String },

    #[error("magnitude {magnitude} out of range in {raw:?}")]
    MagnitudeOverflow { raw: String, magnitude: String },
}

impl Anomaly {
    /// The offending label text.
    pub fn raw(&self) -> &str {
        match self {
            Anomaly::NoMatch { raw }
            | Anomaly::UnknownUnit { raw, .. }
            | Anomaly::MagnitudeOverflow { raw, .. } => raw,
        }
    }
}

/// An absolute instant derived from a [`TimeLabel`] and the run's reference now.
///
/// When the label could not be parsed, `instant` is the reference now and
/// `anomaly` records why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedInstant {
    pub instant: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<Anomaly>,
}

impl ParsedInstant {
    pub fn exact(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            anomaly: None,
        }
    }

    pub fn degraded(now: DateTime<Utc>, anomaly: Anomaly) -> Self {
        Self {
            instant: now,
            anomaly: Some(anomaly),
        }
    }

    pub fn is_anomalous(&self) -> bool {
        self.anomaly.is_some()
    }
}

/// One row of the listing, in the order the source presented it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub title: String,
    pub label: TimeLabel,
    pub parsed: ParsedInstant,
}

impl ListingEntry {
    pub fn new(title: impl Into<String>, label: TimeLabel, parsed: ParsedInstant) -> Self {
        Self {
            title: title.into(),
            label,
            parsed,
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.parsed.instant
    }
}

/// An adjacent pair where `current` is strictly more recent than `previous`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inversion {
    /// Position of `current` in the listing (always >= 1).
    pub index: usize,
    pub previous: ListingEntry,
    pub current: ListingEntry,
    /// How much newer `current` is than `previous`, rounded to whole minutes.
    pub delta_minutes: i64,
}

impl Inversion {
    pub fn delta(&self) -> TimeDelta {
        self.current.instant() - self.previous.instant()
    }
}

/// How far the validator scans once it finds a violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Stop at the first inversion.
    #[default]
    FirstInversion,
    /// Record every inversion in the sequence.
    Exhaustive,
}

/// Outcome of checking one ordered sequence of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub sorted: bool,
    pub inversions: Vec<Inversion>,
    /// Adjacent pairs examined before the scan finished or stopped.
    pub pairs_checked: usize,
    /// Pairs skipped because both instants were identical.
    pub ties: usize,
}

impl ValidationVerdict {
    pub fn first_inversion(&self) -> Option<&Inversion> {
        self.inversions.first()
    }
}
