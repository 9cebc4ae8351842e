//! I/O helpers for xetra commands.

pub mod bucket;
pub mod config;
pub mod frame;
pub mod meta;
