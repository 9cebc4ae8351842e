//! Planning which source dates a run must extract.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Dates a run works on.
///
/// `dates` includes one day before `extract_date` so the first reported day
/// can be compared against its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractPlan {
    /// First date that ends up in the report. `None` when everything up to
    /// today has already been processed.
    pub extract_date: Option<NaiveDate>,
    /// All dates whose source files must be read, ascending.
    pub dates: Vec<NaiveDate>,
}

impl ExtractPlan {
    /// Nothing left to process.
    pub fn is_empty(&self) -> bool {
        self.extract_date.is_none()
    }

    /// Dates that are recorded in the meta file once the run succeeds.
    pub fn meta_update_dates(&self) -> Vec<NaiveDate> {
        match self.extract_date {
            Some(first) => self.dates.iter().copied().filter(|d| *d >= first).collect(),
            None => Vec::new(),
        }
    }
}

/// Build the extract plan from the configured first date and the set of
/// already processed source dates.
///
/// `processed` is `None` when no meta file exists yet; every date from
/// `first_date` up to `today` is then extracted.
pub fn plan_extract_dates(
    first_date: NaiveDate,
    today: NaiveDate,
    processed: Option<&BTreeSet<NaiveDate>>,
) -> ExtractPlan {
    let start = first_date.pred_opt().unwrap_or(first_date);
    let window = date_range(start, today);

    let Some(processed) = processed else {
        return ExtractPlan {
            extract_date: Some(first_date),
            dates: window,
        };
    };

    let first_missing = window
        .iter()
        .skip(1)
        .find(|date| !processed.contains(date))
        .copied();

    match first_missing {
        Some(missing) => {
            let lookback = missing.pred_opt().unwrap_or(missing);
            ExtractPlan {
                extract_date: Some(missing),
                dates: window.into_iter().filter(|d| *d >= lookback).collect(),
            }
        }
        None => ExtractPlan {
            extract_date: None,
            dates: Vec::new(),
        },
    }
}

/// Inclusive ascending range; empty when `from > to`.
fn date_range(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = from;
    while current <= to {
        out.push(current);
        match current.checked_add_days(Days::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset: u64) -> NaiveDate {
        today() - Days::new(offset)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("date")
    }

    fn days(offsets: &[u64]) -> Vec<NaiveDate> {
        offsets.iter().map(|o| day(*o)).collect()
    }

    #[test]
    fn without_meta_file_extracts_from_day_before_first_date() {
        let plan = plan_extract_dates(day(2), today(), None);
        assert_eq!(plan.extract_date, Some(day(2)));
        assert_eq!(plan.dates, days(&[3, 2, 1, 0]));
        assert_eq!(plan.meta_update_dates(), days(&[2, 1, 0]));
    }

    #[test]
    fn with_meta_file_starts_at_first_missing_date() {
        let processed: BTreeSet<NaiveDate> = days(&[3, 4]).into_iter().collect();

        let plan = plan_extract_dates(day(1), today(), Some(&processed));
        assert_eq!(plan.extract_date, Some(day(1)));
        assert_eq!(plan.dates, days(&[2, 1, 0]));

        let plan = plan_extract_dates(day(4), today(), Some(&processed));
        assert_eq!(plan.extract_date, Some(day(2)));
        assert_eq!(plan.dates, days(&[3, 2, 1, 0]));

        let plan = plan_extract_dates(day(7), today(), Some(&processed));
        assert_eq!(plan.extract_date, Some(day(7)));
        assert_eq!(plan.dates, days(&[8, 7, 6, 5, 4, 3, 2, 1, 0]));
        assert_eq!(plan.meta_update_dates(), days(&[7, 6, 5, 4, 3, 2, 1, 0]));
    }

    #[test]
    fn everything_processed_yields_empty_plan() {
        let processed: BTreeSet<NaiveDate> = days(&[0, 1]).into_iter().collect();
        let plan = plan_extract_dates(day(0), today(), Some(&processed));
        assert!(plan.is_empty());
        assert!(plan.dates.is_empty());
        assert!(plan.meta_update_dates().is_empty());
    }

    #[test]
    fn first_date_tomorrow_reads_only_today() {
        let tomorrow = today() + Days::new(1);
        let plan = plan_extract_dates(tomorrow, today(), None);
        assert_eq!(plan.extract_date, Some(tomorrow));
        assert_eq!(plan.dates, vec![today()]);
        assert!(plan.meta_update_dates().is_empty());
    }
}
