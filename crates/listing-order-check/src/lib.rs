//! Listing order check — verify that a live listing is ordered newest first.
//!
//! Drives a page fetcher over the listing, parses each item's relative time
//! label against one reference instant, and validates the resulting sequence.

pub mod collect;
pub mod config;
pub mod error;
pub mod page;
pub mod report;
pub mod retry;
pub mod runner;

pub use collect::{collect, AnomalyRecord, Collection};
pub use config::{CheckConfig, ConfigOverrides, Engine, Selectors, Viewport};
pub use error::{CheckError, CheckResult, RowField};
pub use report::{RunFailure, RunReport};
pub use runner::run;
