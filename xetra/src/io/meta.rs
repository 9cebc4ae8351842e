//! The meta file in the target bucket: which source dates were processed and when.
//!
//! Layout is a CSV with the columns `source_date` (`%Y-%m-%d`) and
//! `datetime_of_processing` (`%Y-%m-%d %H:%M:%S`). New rows are appended on
//! every successful run.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::core::dates::{ExtractPlan, plan_extract_dates};
use crate::core::types::FileFormat;
use crate::error::EtlError;
use crate::io::bucket::BucketConnector;
use crate::io::frame::CsvTable;

pub const META_SOURCE_DATE_COL: &str = "source_date";
pub const META_PROCESS_COL: &str = "datetime_of_processing";
pub const META_DATE_FORMAT: &str = "%Y-%m-%d";
pub const META_PROCESS_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const META_SEPARATOR: u8 = b',';

/// Source dates recorded in the meta file, or `None` if it does not exist.
pub async fn processed_dates(
    bucket: &BucketConnector,
    meta_key: &str,
) -> Result<Option<BTreeSet<NaiveDate>>> {
    let Some(table) = bucket.read_csv_if_exists(meta_key, META_SEPARATOR).await? else {
        debug!(meta_key, "meta file not found");
        return Ok(None);
    };
    let values = table
        .column(META_SOURCE_DATE_COL)
        .ok_or_else(|| EtlError::MissingColumn {
            key: meta_key.to_string(),
            column: META_SOURCE_DATE_COL.to_string(),
        })?;

    let mut dates = BTreeSet::new();
    for (row, value) in values.into_iter().enumerate() {
        let Some(value) = value else { continue };
        let date = NaiveDate::parse_from_str(value, META_DATE_FORMAT).map_err(|_| {
            EtlError::InvalidValue {
                key: meta_key.to_string(),
                row,
                column: META_SOURCE_DATE_COL.to_string(),
                value: value.to_string(),
            }
        })?;
        dates.insert(date);
    }
    Ok(Some(dates))
}

/// Work out which dates the next run extracts, based on the meta file.
pub async fn return_date_list(
    first_date: NaiveDate,
    meta_key: &str,
    bucket: &BucketConnector,
    today: NaiveDate,
) -> Result<ExtractPlan> {
    let processed = processed_dates(bucket, meta_key).await?;
    let plan = plan_extract_dates(first_date, today, processed.as_ref());
    debug!(
        extract_date = ?plan.extract_date,
        dates = plan.dates.len(),
        "extract plan computed"
    );
    Ok(plan)
}

/// Append `dates` to the meta file, stamped with `processed_at`.
///
/// An existing meta file must have exactly the two meta columns. When neither
/// an existing file nor new dates are present, nothing is written.
pub async fn update_meta_file(
    dates: &[NaiveDate],
    meta_key: &str,
    bucket: &BucketConnector,
    processed_at: NaiveDateTime,
) -> Result<()> {
    let expected = vec![META_SOURCE_DATE_COL.to_string(), META_PROCESS_COL.to_string()];
    let mut table = CsvTable::new(expected.clone());

    if let Some(old) = bucket.read_csv_if_exists(meta_key, META_SEPARATOR).await? {
        let mut found = old.columns.clone();
        found.sort();
        let mut wanted = expected.clone();
        wanted.sort();
        if found != wanted {
            return Err(EtlError::WrongMetaFile {
                key: meta_key.to_string(),
                found: old.columns,
                expected,
            }
            .into());
        }
        let order: Vec<usize> = expected
            .iter()
            .filter_map(|name| old.column_index(name))
            .collect();
        table.rows.extend(
            old.rows
                .into_iter()
                .map(|row| order.iter().map(|idx| row.get(*idx).cloned().flatten()).collect()),
        );
    }

    let stamp = processed_at.format(META_PROCESS_DATE_FORMAT).to_string();
    table.rows.extend(dates.iter().map(|date| {
        vec![
            Some(date.format(META_DATE_FORMAT).to_string()),
            Some(stamp.clone()),
        ]
    }));

    let batch = table.to_batch().context("build meta batch")?;
    let written = bucket
        .write_batch(&batch, meta_key, FileFormat::Csv)
        .await
        .with_context(|| format!("write meta file {meta_key}"))?;
    if written {
        info!(meta_key, appended = dates.len(), "meta file updated");
    }
    Ok(())
}
