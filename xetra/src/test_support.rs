//! Test-only fixtures: configs, trade records, and seeded buckets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tempfile::TempDir;

use crate::core::types::{FileFormat, TradeRecord};
use crate::io::bucket::BucketConnector;
use crate::io::config::{
    JobConfig, LoggingConfig, MetaConfig, RunConfig, S3Config, SourceConfig, TargetConfig,
};

/// Header of the public Xetra trade files.
pub const XETRA_COLUMNS: [&str; 14] = [
    "ISIN",
    "Mnemonic",
    "SecurityDesc",
    "SecurityType",
    "Currency",
    "SecurityID",
    "Date",
    "Time",
    "StartPrice",
    "MaxPrice",
    "MinPrice",
    "EndPrice",
    "TradedVolume",
    "NumberOfTrades",
];

/// Create a trade record with the fields the report reads.
pub fn trade(
    isin: &str,
    date: NaiveDate,
    time: &str,
    start_price: f64,
    min_price: f64,
    max_price: f64,
    traded_volume: i64,
) -> TradeRecord {
    TradeRecord {
        isin: isin.to_string(),
        date,
        time: time.to_string(),
        start_price,
        min_price,
        max_price,
        traded_volume,
    }
}

/// Source layout matching the Xetra files.
pub fn source_config(first_extract_date: NaiveDate) -> SourceConfig {
    SourceConfig {
        first_extract_date,
        columns: [
            "ISIN",
            "Mnemonic",
            "Date",
            "Time",
            "StartPrice",
            "EndPrice",
            "MinPrice",
            "MaxPrice",
            "TradedVolume",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
        col_date: "Date".to_string(),
        col_isin: "ISIN".to_string(),
        col_time: "Time".to_string(),
        col_start_price: "StartPrice".to_string(),
        col_min_price: "MinPrice".to_string(),
        col_max_price: "MaxPrice".to_string(),
        col_traded_vol: "TradedVolume".to_string(),
        separator: ',',
    }
}

/// Report 1 target layout written as Parquet.
pub fn target_config() -> TargetConfig {
    TargetConfig {
        col_isin: "isin".to_string(),
        col_date: "date".to_string(),
        col_op_price: "opening_price_eur".to_string(),
        col_close_price: "closing_price_eur".to_string(),
        col_min_price: "minimum_price_eur".to_string(),
        col_max_price: "maximum_price_eur".to_string(),
        col_daily_trade_vol: "daily_traded_volume".to_string(),
        col_ch_prev_close: "change_prev_closing_%".to_string(),
        key: "report1/xetra_daily_report1_".to_string(),
        key_date_format: "%Y%m%d_%H%M%S".to_string(),
        format: FileFormat::Parquet,
    }
}

/// Complete job config pointing both buckets at the given endpoints.
pub fn job_config(src_endpoint_url: &str, trg_endpoint_url: &str) -> JobConfig {
    JobConfig {
        logging: LoggingConfig::default(),
        s3: S3Config {
            src_endpoint_url: src_endpoint_url.to_string(),
            src_bucket: "xetra-src".to_string(),
            trg_endpoint_url: trg_endpoint_url.to_string(),
            trg_bucket: "xetra-trg".to_string(),
            region: None,
        },
        source: source_config(NaiveDate::from_ymd_opt(2024, 3, 12).unwrap_or_default()),
        target: target_config(),
        meta: MetaConfig {
            meta_key: "meta_file.csv".to_string(),
        },
        job: RunConfig::default(),
    }
}

/// One line of a Xetra trade CSV, ordered like [`XETRA_COLUMNS`].
pub fn xetra_csv_line(record: &TradeRecord) -> String {
    format!(
        "{isin},SANT,S+T AG O.N.,Common stock,EUR,2504159,{date},{time},{start},{max},{min},{start},{vol},3",
        isin = record.isin,
        date = record.date.format("%Y-%m-%d"),
        time = record.time,
        start = record.start_price,
        max = record.max_price,
        min = record.min_price,
        vol = record.traded_volume,
    )
}

/// Store each record as its own Xetra-style file, `YYYY-MM-DD/YYYY-MM-DD_BINS_XETRHH.csv`.
pub async fn seed_xetra_files(bucket: &BucketConnector, records: &[TradeRecord]) -> Result<()> {
    let header = XETRA_COLUMNS.join(",");
    for record in records {
        let date = record.date.format("%Y-%m-%d");
        let hour = record.time.split(':').next().unwrap_or("00");
        let key = format!("{date}/{date}_BINS_XETR{hour}.csv");
        let body = format!("{header}\n{}\n", xetra_csv_line(record));
        bucket
            .put_bytes(&key, body)
            .await
            .with_context(|| format!("seed {key}"))?;
    }
    Ok(())
}

/// Temporary directory holding `file://` source and target buckets.
pub struct LocalBuckets {
    dir: TempDir,
}

impl LocalBuckets {
    /// Create the directory with empty `xetra-src` and `xetra-trg` buckets.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        for bucket in ["xetra-src", "xetra-trg"] {
            std::fs::create_dir_all(dir.path().join(bucket))
                .with_context(|| format!("create bucket dir {bucket}"))?;
        }
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn endpoint_url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.dir.path().join(bucket)
    }

    /// Job config using these buckets for source and target.
    pub fn job_config(&self) -> JobConfig {
        let endpoint = self.endpoint_url();
        job_config(&endpoint, &endpoint)
    }
}
