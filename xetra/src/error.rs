//! Domain failures that callers need to tell apart from plain I/O errors.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EtlError {
    /// The meta file exists but its columns are not exactly the expected set.
    #[error("meta file {key} has columns [{}], expected [{}]", found.join(", "), expected.join(", "))]
    WrongMetaFile {
        key: String,
        found: Vec<String>,
        expected: Vec<String>,
    },

    /// A CSV object lacks a column the job needs.
    #[error("column '{column}' missing in {key}")]
    MissingColumn { key: String, column: String },

    /// A cell could not be parsed into the type the job needs.
    #[error("invalid {column} value '{value}' in {key} (row {row})")]
    InvalidValue {
        key: String,
        row: usize,
        column: String,
        value: String,
    },

    /// Summing a day's traded volume left the `i64` range.
    #[error("daily traded volume of {isin} on {date} overflows")]
    VolumeOverflow { isin: String, date: NaiveDate },
}
