//! Deterministic, pure logic shared by the ETL.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod dates;
pub mod report;
pub mod types;
