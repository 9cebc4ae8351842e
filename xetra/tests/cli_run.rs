//! CLI tests for `xetra run`, `xetra plan`, and `xetra check`.
//!
//! Spawns the xetra binary against `file://` buckets in a temp directory and
//! verifies exit codes and written objects.

use std::fs;
use std::process::{Command, Output};

use chrono::{Days, Local};
use xetra::exit_codes;
use xetra::io::bucket::BucketConnector;
use xetra::io::config::write_config;
use xetra::test_support::{LocalBuckets, seed_xetra_files, trade};

fn xetra(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xetra"))
        .args(args)
        .env_remove("XETRA_CONFIG")
        .env("RUST_LOG", "warn")
        .output()
        .expect("spawn xetra")
}

fn write_job_config(buckets: &LocalBuckets) -> String {
    let mut cfg = buckets.job_config();
    let today = Local::now().date_naive();
    cfg.source.first_extract_date = today - Days::new(1);
    let path = buckets.path().join("job.toml");
    write_config(&path, &cfg).expect("write config");
    path.display().to_string()
}

#[test]
fn missing_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("absent.toml");
    let output = xetra(&["check", &path.display().to_string()]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.toml"));
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("job.toml");
    fs::write(&path, "[s3]\nsrc_bucket = 1\n").expect("write");
    let output = xetra(&["run", &path.display().to_string()]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn check_accepts_valid_config() {
    let buckets = LocalBuckets::new().expect("buckets");
    let config = write_job_config(&buckets);
    let output = xetra(&["check", &config]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
}

#[tokio::test]
async fn run_writes_report_and_meta_file() {
    let buckets = LocalBuckets::new().expect("buckets");
    let config = write_job_config(&buckets);
    let yesterday = Local::now().date_naive() - Days::new(1);
    let src = BucketConnector::connect(&buckets.endpoint_url(), "xetra-src", None).expect("src");
    seed_xetra_files(
        &src,
        &[
            trade("AT0000A0E9W5", yesterday, "07:00", 23.58, 23.58, 23.58, 1035),
            trade("AT0000A0E9W5", yesterday, "09:00", 24.22, 22.21, 25.01, 1523),
        ],
    )
    .await
    .expect("seed");

    let output = xetra(&["run", &config]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("report_rows=1"), "stdout: {stdout}");

    let trg_dir = buckets.bucket_dir("xetra-trg");
    assert!(trg_dir.join("meta_file.csv").exists());
    let reports: Vec<_> = fs::read_dir(trg_dir.join("report1"))
        .expect("report dir")
        .collect();
    assert_eq!(reports.len(), 1);

    // Everything up to today is processed now.
    let output = xetra(&["plan", &config]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("nothing to process"));
}

#[test]
fn run_with_corrupt_meta_file_exits_failed() {
    let buckets = LocalBuckets::new().expect("buckets");
    let config = write_job_config(&buckets);
    fs::write(
        buckets.bucket_dir("xetra-trg").join("meta_file.csv"),
        "source_date,datetime_of_processing\nnot-a-date,x\n",
    )
    .expect("write meta");

    let output = xetra(&["run", &config]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not-a-date"));
}

#[test]
fn plan_json_lists_dates_without_writing() {
    let buckets = LocalBuckets::new().expect("buckets");
    let config = write_job_config(&buckets);

    let output = xetra(&["plan", "--json", &config]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let today = Local::now().date_naive();
    assert_eq!(
        plan["extract_date"],
        serde_json::json!((today - Days::new(1)).format("%Y-%m-%d").to_string())
    );
    assert_eq!(plan["dates"].as_array().map(Vec::len), Some(3));
    assert!(
        fs::read_dir(buckets.bucket_dir("xetra-trg"))
            .expect("trg dir")
            .next()
            .is_none()
    );
}
