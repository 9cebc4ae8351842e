//! Report 1: daily opening/closing/min/max prices and traded volume per ISIN.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::NaiveDate;

use crate::core::types::{ReportRow, TradeRecord};
use crate::error::EtlError;

/// Aggregate trade records into report rows.
///
/// Rows are grouped by `(isin, date)` and returned in that order. Only days on
/// or after `extract_date` are returned; earlier days only feed the change
/// against the previous trading day. With `extract_date = None` the result is
/// empty. Fails when a day's summed volume does not fit an `i64`.
pub fn build_report1(
    records: &[TradeRecord],
    extract_date: Option<NaiveDate>,
) -> Result<Vec<ReportRow>, EtlError> {
    let Some(extract_date) = extract_date else {
        return Ok(Vec::new());
    };

    let mut groups: BTreeMap<(&str, NaiveDate), DailyAggregate<'_>> = BTreeMap::new();
    for record in records {
        match groups.entry((record.isin.as_str(), record.date)) {
            Entry::Vacant(slot) => {
                slot.insert(DailyAggregate::new(record));
            }
            Entry::Occupied(mut slot) => slot.get_mut().push(record)?,
        }
    }

    let mut rows = Vec::with_capacity(groups.len());
    let mut previous: Option<(&str, f64)> = None;
    for ((isin, date), agg) in groups {
        // BTreeMap order groups each ISIN's days together, ascending by date.
        let prev_opening = match previous {
            Some((prev_isin, opening)) if prev_isin == isin => Some(opening),
            _ => None,
        };
        let opening = agg.opening.start_price;
        previous = Some((isin, opening));

        if date < extract_date {
            continue;
        }
        rows.push(ReportRow {
            isin: isin.to_string(),
            date,
            opening_price: round2(opening),
            closing_price: round2(agg.closing.start_price),
            minimum_price: round2(agg.minimum_price),
            maximum_price: round2(agg.maximum_price),
            daily_traded_volume: agg.traded_volume,
            change_prev_closing: prev_opening
                .filter(|prev| *prev != 0.0)
                .map(|prev| round2((opening - prev) / prev * 100.0)),
        });
    }
    Ok(rows)
}

struct DailyAggregate<'a> {
    opening: &'a TradeRecord,
    closing: &'a TradeRecord,
    minimum_price: f64,
    maximum_price: f64,
    traded_volume: i64,
}

impl<'a> DailyAggregate<'a> {
    fn new(record: &'a TradeRecord) -> Self {
        Self {
            opening: record,
            closing: record,
            minimum_price: record.min_price,
            maximum_price: record.max_price,
            traded_volume: record.traded_volume,
        }
    }

    fn push(&mut self, record: &'a TradeRecord) -> Result<(), EtlError> {
        // Ties keep the earliest record for opening and the latest for closing.
        if record.time < self.opening.time {
            self.opening = record;
        }
        if record.time >= self.closing.time {
            self.closing = record;
        }
        self.minimum_price = self.minimum_price.min(record.min_price);
        self.maximum_price = self.maximum_price.max(record.max_price);
        self.traded_volume = self
            .traded_volume
            .checked_add(record.traded_volume)
            .ok_or_else(|| EtlError::VolumeOverflow {
                isin: record.isin.clone(),
                date: record.date,
            })?;
        Ok(())
    }
}

/// Round to two decimals, ties to even.
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
