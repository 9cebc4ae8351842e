//! Job configuration loaded from a TOML file (see `config/xetra_report1.toml`).

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::core::types::FileFormat;

/// Complete configuration for one `xetra run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub s3: S3Config,
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub meta: MetaConfig,
    #[serde(default)]
    pub job: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `xetra=debug,warn`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Source and target buckets.
///
/// Endpoints starting with `file://` or `memory://` select a local or
/// in-memory store instead of S3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct S3Config {
    pub src_endpoint_url: String,
    pub src_bucket: String,
    pub trg_endpoint_url: String,
    pub trg_bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Layout of the Xetra source CSVs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// Earliest trading date to report on (`YYYY-MM-DD`, quoted).
    pub first_extract_date: NaiveDate,
    /// Columns kept from the source; rows missing any of them are dropped.
    pub columns: Vec<String>,
    pub col_date: String,
    pub col_isin: String,
    pub col_time: String,
    pub col_start_price: String,
    pub col_min_price: String,
    pub col_max_price: String,
    pub col_traded_vol: String,
    #[serde(default = "default_separator")]
    pub separator: char,
}

fn default_separator() -> char {
    ','
}

/// Column names and object key of the written report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    pub col_isin: String,
    pub col_date: String,
    pub col_op_price: String,
    pub col_close_price: String,
    pub col_min_price: String,
    pub col_max_price: String,
    pub col_daily_trade_vol: String,
    pub col_ch_prev_close: String,
    /// Key prefix; the run timestamp and extension are appended.
    pub key: String,
    /// strftime format of the run timestamp in the key.
    pub key_date_format: String,
    pub format: FileFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaConfig {
    /// Key of the meta file in the target bucket.
    pub meta_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Abort the run after this many seconds. No deadline when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        self.s3.validate()?;
        self.source.validate()?;
        self.target.validate()?;
        if self.meta.meta_key.trim().is_empty() {
            return Err(anyhow!("meta.meta_key must not be empty"));
        }
        if self.job.timeout_secs == Some(0) {
            return Err(anyhow!("job.timeout_secs must be > 0"));
        }
        self.logging.validate()
    }
}

impl LoggingConfig {
    /// A bare directive must be a level; `EnvFilter` would read a misspelt
    /// level such as `inof` as a target name.
    pub fn validate(&self) -> Result<()> {
        tracing_subscriber::EnvFilter::try_new(&self.level)
            .map_err(|err| anyhow!("logging.level '{}' is invalid: {err}", self.level))?;
        for directive in self.level.split(',').map(str::trim) {
            if directive.is_empty() || directive.contains(['=', '[']) {
                continue;
            }
            if directive.parse::<LevelFilter>().is_err() {
                return Err(anyhow!(
                    "logging.level '{}' has unknown level '{directive}'",
                    self.level
                ));
            }
        }
        Ok(())
    }
}

impl S3Config {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("s3.src_endpoint_url", &self.src_endpoint_url),
            ("s3.src_bucket", &self.src_bucket),
            ("s3.trg_endpoint_url", &self.trg_endpoint_url),
            ("s3.trg_bucket", &self.trg_bucket),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        Ok(())
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(anyhow!("source.columns must be a non-empty array"));
        }
        for (name, column) in self.required_columns() {
            if !self.columns.iter().any(|c| c == column) {
                return Err(anyhow!(
                    "source.{name} '{column}' is not listed in source.columns"
                ));
            }
        }
        if !self.separator.is_ascii() {
            return Err(anyhow!("source.separator must be a single ASCII character"));
        }
        Ok(())
    }

    /// Config key and column name of every column the report reads.
    pub fn required_columns(&self) -> [(&'static str, &str); 7] {
        [
            ("col_date", &self.col_date),
            ("col_isin", &self.col_isin),
            ("col_time", &self.col_time),
            ("col_start_price", &self.col_start_price),
            ("col_min_price", &self.col_min_price),
            ("col_max_price", &self.col_max_price),
            ("col_traded_vol", &self.col_traded_vol),
        ]
    }

    pub fn separator_byte(&self) -> u8 {
        u8::try_from(self.separator).unwrap_or(b',')
    }
}

impl TargetConfig {
    pub fn validate(&self) -> Result<()> {
        let columns = self.report_columns();
        let mut seen = BTreeSet::new();
        for column in columns {
            if column.trim().is_empty() {
                return Err(anyhow!("target column names must not be empty"));
            }
            if !seen.insert(column) {
                return Err(anyhow!("target column '{column}' is used twice"));
            }
        }
        if self.key.trim().is_empty() {
            return Err(anyhow!("target.key must not be empty"));
        }
        if StrftimeItems::new(&self.key_date_format).any(|item| matches!(item, Item::Error)) {
            return Err(anyhow!(
                "target.key_date_format '{}' is not a valid strftime format",
                self.key_date_format
            ));
        }
        Ok(())
    }

    /// Report column names in output order.
    pub fn report_columns(&self) -> [&str; 8] {
        [
            &self.col_isin,
            &self.col_date,
            &self.col_op_price,
            &self.col_close_price,
            &self.col_min_price,
            &self.col_max_price,
            &self.col_daily_trade_vol,
            &self.col_ch_prev_close,
        ]
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: JobConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Write config to disk as TOML.
pub fn write_config(path: &Path, cfg: &JobConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::job_config;

    const SAMPLE: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/config/xetra_report1.toml"
    ));

    #[test]
    fn bundled_config_is_valid() {
        let cfg: JobConfig = toml::from_str(SAMPLE).expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.target.format, FileFormat::Parquet);
        assert_eq!(cfg.source.separator, ',');
        assert_eq!(cfg.job.timeout_secs, None);
    }

    #[test]
    fn load_missing_file_names_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("missing.toml");
        let err = load_config(&path).expect_err("missing");
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = job_config("memory://", "memory://");
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn unknown_target_format_is_rejected() {
        let broken = SAMPLE.replace("format = \"parquet\"", "format = \"xlsx\"");
        let err = toml::from_str::<JobConfig>(&broken).expect_err("unknown format");
        assert!(err.to_string().contains("xlsx"));
    }

    #[test]
    fn validate_reports_unlisted_source_column() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.source.col_time = "Uhrzeit".to_string();
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("source.col_time"));
    }

    #[test]
    fn validate_reports_duplicate_target_column() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.target.col_close_price = cfg.target.col_op_price.clone();
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("used twice"));
    }

    #[test]
    fn validate_reports_bad_key_date_format() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.target.key_date_format = "%Y%m%d_%".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut cfg = job_config("memory://", "memory://");
        for level in ["inof", "xetra=loud", "warn,verbose"] {
            cfg.logging.level = level.to_string();
            let err = cfg.validate().expect_err(level);
            assert!(err.to_string().contains("logging.level"), "{err}");
        }

        cfg.logging.level = "xetra=debug,warn".to_string();
        cfg.validate().expect("directive list is valid");
    }

    #[test]
    fn validate_rejects_empty_endpoint_and_bucket() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.s3.src_endpoint_url = String::new();
        let err = cfg.validate().expect_err("empty endpoint");
        assert!(err.to_string().contains("s3.src_endpoint_url"));

        let mut cfg = job_config("memory://", "memory://");
        cfg.s3.trg_bucket = "  ".to_string();
        let err = cfg.validate().expect_err("empty bucket");
        assert!(err.to_string().contains("s3.trg_bucket"));
    }

    #[test]
    fn validate_rejects_empty_meta_key() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.meta.meta_key = String::new();
        let err = cfg.validate().expect_err("empty meta key");
        assert!(err.to_string().contains("meta.meta_key"));
    }

    #[test]
    fn validate_rejects_empty_target_column() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.target.col_ch_prev_close = " ".to_string();
        let err = cfg.validate().expect_err("empty column");
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn validate_rejects_non_ascii_separator() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.source.separator = '§';
        let err = cfg.validate().expect_err("separator");
        assert!(err.to_string().contains("source.separator"));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut cfg = job_config("memory://", "memory://");
        cfg.job.timeout_secs = Some(0);
        assert!(cfg.validate().is_err());
    }
}
