//! Relative time label parsing.
//!
//! Converts labels such as "5 minutes ago" into absolute instants against a
//! reference `now` captured once per run. Parsing never fails the caller:
//! a label that cannot be converted degrades to `now` and carries an
//! [`Anomaly`] describing the problem.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{Anomaly, ParsedInstant, TimeLabel};

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;
/// Fixed 30-day month.
pub const MONTH_MS: i64 = 2_592_000_000;
/// Fixed 365-day year.
pub const YEAR_MS: i64 = 31_536_000_000;

/// Units recognized in relative time labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 5] = [
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
        TimeUnit::Month,
        TimeUnit::Year,
    ];

    /// Fixed length of one unit in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Minute => MINUTE_MS,
            TimeUnit::Hour => HOUR_MS,
            TimeUnit::Day => DAY_MS,
            TimeUnit::Month => MONTH_MS,
            TimeUnit::Year => YEAR_MS,
        }
    }

    /// Match a unit word, case-insensitively, singular or plural.
    pub fn from_word(word: &str) -> Option<Self> {
        let lower = word.to_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        Self::ALL.into_iter().find(|unit| unit.as_str() == singular)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([0-9]+)\s+(\w+)").expect("label regex is valid"))
}

/// Convert a label to an absolute instant, or explain why it can't be.
///
/// The first `<digits> <word>` occurrence in the label is used. The result is
/// `now - magnitude * unit`, with no calendar or timezone adjustment.
pub fn try_parse_label(label: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, Anomaly> {
    let caps = label_pattern()
        .captures(label)
        .ok_or_else(|| Anomaly::NoMatch {
            raw: label.to_string(),
        })?;
    let magnitude_text = &caps[1];
    let unit_word = &caps[2];

    let unit = TimeUnit::from_word(unit_word).ok_or_else(|| Anomaly::UnknownUnit {
        raw: label.to_string(),
        unit: unit_word.to_string(),
    })?;

    let overflow = || Anomaly::MagnitudeOverflow {
        raw: label.to_string(),
        magnitude: magnitude_text.to_string(),
    };

    let magnitude: i64 = magnitude_text.parse().map_err(|_| overflow())?;
    let offset = magnitude
        .checked_mul(unit.millis())
        .and_then(TimeDelta::try_milliseconds)
        .ok_or_else(overflow)?;

    now.checked_sub_signed(offset).ok_or_else(overflow)
}

/// Convert a label to a [`ParsedInstant`], degrading to `now` on anomalies.
pub fn parse_label(label: &str, now: DateTime<Utc>) -> ParsedInstant {
    match try_parse_label(label, now) {
        Ok(instant) => ParsedInstant::exact(instant),
        Err(anomaly) => {
            tracing::warn!(label, "time label anomaly, using reference now: {anomaly}");
            ParsedInstant::degraded(now, anomaly)
        }
    }
}

/// Parser bound to a single reference instant.
///
/// Every label parsed through one `LabelParser` is measured against the same
/// `now`, so entries of a run stay comparable with each other.
#[derive(Debug, Clone, Copy)]
pub struct LabelParser {
    now: DateTime<Utc>,
}

impl LabelParser {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Capture the wall clock once and bind to it.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn parse(&self, label: &TimeLabel) -> ParsedInstant {
        parse_label(label.as_str(), self.now)
    }
}
