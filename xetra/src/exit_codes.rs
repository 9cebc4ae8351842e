//! Stable exit codes for xetra CLI commands.

/// Command succeeded (including runs with nothing left to process).
pub const OK: i32 = 0;
/// The ETL run failed at runtime (storage, corrupt meta file, bad source data).
pub const FAILED: i32 = 1;
/// Configuration could not be loaded or validated. Matches clap's usage error code.
pub const INVALID: i32 = 2;
/// A termination signal (SIGINT/SIGTERM) stopped the run.
pub const INTERRUPTED: i32 = 3;
/// The configured `job.timeout_secs` deadline expired.
pub const TIMED_OUT: i32 = 4;
