//! Tracing setup for the batch job.
//!
//! The level comes from the `[logging]` table of the job config; `RUST_LOG`
//! overrides it when set. Output goes to stderr so stdout stays reserved for
//! command results (`xetra plan`).

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::io::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=xetra=debug xetra run config/xetra_report1.toml
/// ```
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .with_context(|| format!("parse log level '{}'", cfg.level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match cfg.format {
        LogFormat::Compact => registry
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
    };
    installed.context("install tracing subscriber")
}
