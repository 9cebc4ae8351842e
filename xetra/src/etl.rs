//! Extract, transform and load for report 1.

use std::fmt::Write as _;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::info;

use crate::core::dates::ExtractPlan;
use crate::core::report::build_report1;
use crate::core::types::{ReportRow, TradeRecord};
use crate::error::EtlError;
use crate::io::bucket::BucketConnector;
use crate::io::config::{SourceConfig, TargetConfig};
use crate::io::frame::{CsvTable, report_batch};
use crate::io::meta::{META_DATE_FORMAT, return_date_list, update_meta_file};

/// Summary of one `etl_report1` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtlOutcome {
    /// First reported date; `None` when there was nothing to process.
    pub extract_date: Option<NaiveDate>,
    /// Dates appended to the meta file.
    pub processed_dates: Vec<NaiveDate>,
    /// Number of report rows produced.
    pub report_rows: usize,
    /// Key of the written report, if any rows were produced.
    pub target_key: Option<String>,
}

/// Reads the Xetra source data, builds report 1, and writes it to the target.
///
/// The extract plan is fixed at construction from the meta file in the target
/// bucket and the wall-clock time passed in as `now`.
#[derive(Debug)]
pub struct XetraEtl {
    src: BucketConnector,
    trg: BucketConnector,
    meta_key: String,
    source: SourceConfig,
    target: TargetConfig,
    plan: ExtractPlan,
    now: NaiveDateTime,
}

impl XetraEtl {
    pub async fn new(
        src: BucketConnector,
        trg: BucketConnector,
        meta_key: impl Into<String>,
        source: SourceConfig,
        target: TargetConfig,
        now: NaiveDateTime,
    ) -> Result<Self> {
        source.validate()?;
        target.validate()?;
        let meta_key = meta_key.into();
        let plan = return_date_list(source.first_extract_date, &meta_key, &trg, now.date())
            .await
            .context("compute extract dates")?;
        Ok(Self {
            src,
            trg,
            meta_key,
            source,
            target,
            plan,
            now,
        })
    }

    pub fn plan(&self) -> &ExtractPlan {
        &self.plan
    }

    /// Read every source file for the planned dates.
    pub async fn extract(&self) -> Result<Vec<TradeRecord>> {
        info!(dates = self.plan.dates.len(), "extracting Xetra source files started");
        let prefixes: Vec<String> = self
            .plan
            .dates
            .iter()
            .map(|date| date.format(META_DATE_FORMAT).to_string())
            .collect();
        let keys = self.src.list_files_in_prefixes(&prefixes).await?;

        let mut records = Vec::new();
        for key in &keys {
            let table = self.src.read_csv(key, self.source.separator_byte()).await?;
            records.extend(parse_trades(&table, key, &self.source)?);
        }
        info!(
            files = keys.len(),
            records = records.len(),
            "extracting Xetra source files finished"
        );
        Ok(records)
    }

    /// Aggregate the extracted records into report 1 rows.
    pub fn transform_report1(&self, records: &[TradeRecord]) -> Result<Vec<ReportRow>> {
        if records.is_empty() {
            info!("the dataframe is empty, no transformations will be applied");
            return Ok(Vec::new());
        }
        info!("applying transformations to Xetra source data for report 1 started");
        let rows = build_report1(records, self.plan.extract_date)?;
        info!(rows = rows.len(), "applying transformations to Xetra source data finished");
        Ok(rows)
    }

    /// Write the report and record the processed dates in the meta file.
    ///
    /// Returns the report key, or `None` when the report was empty.
    pub async fn load(&self, report: &[ReportRow]) -> Result<Option<String>> {
        let key = self.target_key()?;
        let batch = report_batch(report, &self.target)?;
        let written = self
            .trg
            .write_batch(&batch, &key, self.target.format)
            .await?;
        if written {
            info!(key = %key, "Xetra target data successfully written");
        }

        update_meta_file(
            &self.plan.meta_update_dates(),
            &self.meta_key,
            &self.trg,
            self.now,
        )
        .await?;
        info!("Xetra meta file successfully updated");
        Ok(written.then_some(key))
    }

    /// Extract, transform and load to create report 1.
    pub async fn etl_report1(&self) -> Result<EtlOutcome> {
        let records = self.extract().await?;
        let report = self.transform_report1(&records)?;
        let target_key = self.load(&report).await?;
        Ok(EtlOutcome {
            extract_date: self.plan.extract_date,
            processed_dates: self.plan.meta_update_dates(),
            report_rows: report.len(),
            target_key,
        })
    }

    fn target_key(&self) -> Result<String> {
        let mut key = self.target.key.clone();
        write!(key, "{}", self.now.format(&self.target.key_date_format)).map_err(|_| {
            anyhow!(
                "invalid target.key_date_format '{}'",
                self.target.key_date_format
            )
        })?;
        write!(key, ".{}", self.target.format.extension())?;
        Ok(key)
    }
}

/// Cell values counted as missing, in addition to empty cells.
const MISSING_TOKENS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing(cell: Option<&Option<String>>) -> bool {
    match cell {
        Some(Some(value)) => MISSING_TOKENS.contains(&value.trim()),
        _ => true,
    }
}

/// Convert one decoded source file into trade records.
///
/// Rows with a missing value in any configured source column are dropped.
fn parse_trades(
    table: &CsvTable,
    key: &str,
    source: &SourceConfig,
) -> Result<Vec<TradeRecord>, EtlError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let kept = source
        .columns
        .iter()
        .map(|name| column_index(table, key, name))
        .collect::<Result<Vec<_>, _>>()?;
    let isin = column_index(table, key, &source.col_isin)?;
    let date = column_index(table, key, &source.col_date)?;
    let time = column_index(table, key, &source.col_time)?;
    let start_price = column_index(table, key, &source.col_start_price)?;
    let min_price = column_index(table, key, &source.col_min_price)?;
    let max_price = column_index(table, key, &source.col_max_price)?;
    let traded_vol = column_index(table, key, &source.col_traded_vol)?;

    let mut records = Vec::with_capacity(table.rows.len());
    for (row_no, row) in table.rows.iter().enumerate() {
        if kept.iter().any(|idx| is_missing(row.get(*idx))) {
            continue;
        }
        let cell = Cell { key, row_no, row };
        records.push(TradeRecord {
            isin: cell.text(isin).to_string(),
            date: cell.date(date, &source.col_date)?,
            time: cell.text(time).to_string(),
            start_price: cell.float(start_price, &source.col_start_price)?,
            min_price: cell.float(min_price, &source.col_min_price)?,
            max_price: cell.float(max_price, &source.col_max_price)?,
            traded_volume: cell.integer(traded_vol, &source.col_traded_vol)?,
        });
    }
    Ok(records)
}

fn column_index(table: &CsvTable, key: &str, name: &str) -> Result<usize, EtlError> {
    table
        .column_index(name)
        .ok_or_else(|| EtlError::MissingColumn {
            key: key.to_string(),
            column: name.to_string(),
        })
}

/// One source row, for typed access with error context.
struct Cell<'a> {
    key: &'a str,
    row_no: usize,
    row: &'a [Option<String>],
}

impl Cell<'_> {
    fn text(&self, idx: usize) -> &str {
        self.row
            .get(idx)
            .and_then(|v| v.as_deref())
            .unwrap_or_default()
            .trim()
    }

    fn date(&self, idx: usize, column: &str) -> Result<NaiveDate, EtlError> {
        NaiveDate::parse_from_str(self.text(idx), META_DATE_FORMAT)
            .map_err(|_| self.invalid(idx, column))
    }

    /// Prices must be finite; `NaN` and `inf` are rejected.
    fn float(&self, idx: usize, column: &str) -> Result<f64, EtlError> {
        match self.text(idx).parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.invalid(idx, column)),
        }
    }

    /// Volumes are integral; `877.0` is accepted, `877.5` is not.
    fn integer(&self, idx: usize, column: &str) -> Result<i64, EtlError> {
        let raw = self.text(idx);
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(value);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => Ok(value as i64),
            _ => Err(self.invalid(idx, column)),
        }
    }

    fn invalid(&self, idx: usize, column: &str) -> EtlError {
        EtlError::InvalidValue {
            key: self.key.to_string(),
            row: self.row_no,
            column: column.to_string(),
            value: self.text(idx).to_string(),
        }
    }
}
