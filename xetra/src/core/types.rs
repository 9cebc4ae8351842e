//! Shared deterministic types for the report pipeline.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// File format used when writing objects to a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    /// File extension appended to target keys.
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One row of Xetra source data, reduced to the fields the report needs.
///
/// `time` stays a string: source files use zero-padded `HH:MM`, so
/// lexicographic order is trading order.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub isin: String,
    pub date: NaiveDate,
    pub time: String,
    pub start_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub traded_volume: i64,
}

/// One row of report 1: daily figures for a single ISIN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub isin: String,
    pub date: NaiveDate,
    pub opening_price: f64,
    pub closing_price: f64,
    pub minimum_price: f64,
    pub maximum_price: f64,
    pub daily_traded_volume: i64,
    /// Percent change of the opening price against the previous trading day
    /// of the same ISIN. `None` for the first day seen.
    pub change_prev_closing: Option<f64>,
}
