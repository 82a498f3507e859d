//! Recency ordering validation.
//!
//! A listing is expected newest first: each entry's instant must be equal to
//! or older than the one before it. Equal instants are tolerated because
//! labels only resolve to the minute.

use std::cmp::Ordering;

use crate::types::{Inversion, ListingEntry, ScanMode, ValidationVerdict};

/// Validate with the default mode, stopping at the first inversion.
pub fn validate(entries: &[ListingEntry]) -> ValidationVerdict {
    validate_with(entries, ScanMode::FirstInversion)
}

/// Walk adjacent pairs and record every point where recency increases.
pub fn validate_with(entries: &[ListingEntry], mode: ScanMode) -> ValidationVerdict {
    let mut inversions = Vec::new();
    let mut pairs_checked = 0;
    let mut ties = 0;

    for (offset, pair) in entries.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        pairs_checked += 1;

        match current.instant().cmp(&previous.instant()) {
            Ordering::Less => {}
            Ordering::Equal => ties += 1,
            Ordering::Greater => {
                let delta_ms = (current.instant() - previous.instant()).num_milliseconds();
                let index = offset + 1;
                tracing::debug!(
                    index,
                    previous = %previous.label,
                    current = %current.label,
                    "ordering inversion"
                );
                inversions.push(Inversion {
                    index,
                    previous: previous.clone(),
                    current: current.clone(),
                    delta_minutes: round_to_minutes(delta_ms),
                });
                if mode == ScanMode::FirstInversion {
                    break;
                }
            }
        }
    }

    ValidationVerdict {
        sorted: inversions.is_empty(),
        inversions,
        pairs_checked,
        ties,
    }
}

fn round_to_minutes(ms: i64) -> i64 {
    (ms as f64 / 60_000.0).round() as i64
}
