//! Xetra daily report batch job.
//!
//! Reads the Deutsche Börse Xetra trading CSVs for every date that has not
//! been processed yet, aggregates them into a per-ISIN daily report, and
//! writes the report plus an updated meta file to the target bucket. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (date planning, report
//!   aggregation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (object stores, CSV/Parquet
//!   encoding, config files).
//!
//! Orchestration modules ([`etl`], [`job`]) coordinate core logic with I/O to
//! implement CLI commands.

pub mod core;
pub mod error;
pub mod etl;
pub mod exit_codes;
pub mod io;
pub mod job;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
