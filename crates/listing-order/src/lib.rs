//! Listing order — relative time parsing and newest-first ordering validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_label, try_parse_label, LabelParser, TimeUnit};
pub use types::*;
pub use validator::{validate, validate_with};
