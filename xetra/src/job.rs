//! Process-level job control: one supervised ETL run per invocation.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tracing::{error, info, warn};

use crate::etl::{EtlOutcome, XetraEtl};
use crate::exit_codes;
use crate::io::bucket::BucketConnector;
use crate::io::config::JobConfig;

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    /// The work finished successfully.
    Completed(T),
    /// SIGINT or SIGTERM arrived first.
    Interrupted,
    /// The configured deadline expired first.
    TimedOut,
}

impl<T> JobOutcome<T> {
    pub fn exit_code(&self) -> i32 {
        match self {
            JobOutcome::Completed(_) => exit_codes::OK,
            JobOutcome::Interrupted => exit_codes::INTERRUPTED,
            JobOutcome::TimedOut => exit_codes::TIMED_OUT,
        }
    }
}

/// Dry-run view of what the next run would process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub extract_date: Option<NaiveDate>,
    pub dates: Vec<NaiveDate>,
    pub meta_update_dates: Vec<NaiveDate>,
}

/// Race `work` against `shutdown` and an optional deadline.
///
/// Whichever finishes first decides the outcome; the others are dropped.
pub async fn supervise<T, W, S>(
    work: W,
    timeout: Option<Duration>,
    shutdown: S,
) -> Result<JobOutcome<T>>
where
    W: Future<Output = Result<T>>,
    S: Future<Output = ()>,
{
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        result = work => result.map(JobOutcome::Completed),
        () = shutdown => {
            warn!("termination signal received, stopping");
            Ok(JobOutcome::Interrupted)
        }
        () = deadline => {
            warn!(timeout_secs = ?timeout.map(|t| t.as_secs()), "run deadline expired, stopping");
            Ok(JobOutcome::TimedOut)
        }
    }
}

/// Resolves on SIGINT or (on unix) SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    Some(()) = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

/// Connect both buckets and fix the extract plan.
pub async fn build_etl(cfg: &JobConfig, now: NaiveDateTime) -> Result<XetraEtl> {
    let region = cfg.s3.region.as_deref();
    let src = BucketConnector::connect(&cfg.s3.src_endpoint_url, &cfg.s3.src_bucket, region)
        .context("connect source bucket")?;
    let trg = BucketConnector::connect(&cfg.s3.trg_endpoint_url, &cfg.s3.trg_bucket, region)
        .context("connect target bucket")?;
    XetraEtl::new(
        src,
        trg,
        cfg.meta.meta_key.clone(),
        cfg.source.clone(),
        cfg.target.clone(),
        now,
    )
    .await
}

/// One full report 1 run.
pub async fn run_etl(cfg: &JobConfig, now: NaiveDateTime) -> Result<EtlOutcome> {
    info!("Xetra ETL job started");
    let etl = build_etl(cfg, now).await?;
    let outcome = etl.etl_report1().await?;
    info!(
        extract_date = ?outcome.extract_date,
        processed_dates = outcome.processed_dates.len(),
        report_rows = outcome.report_rows,
        target_key = ?outcome.target_key,
        "Xetra ETL job finished"
    );
    Ok(outcome)
}

/// `xetra run`: execute the job once under signal and deadline supervision.
pub fn run(cfg: &JobConfig) -> Result<JobOutcome<EtlOutcome>> {
    let runtime = build_runtime()?;
    let now = Local::now().naive_local();
    let timeout = cfg.job.timeout_secs.map(Duration::from_secs);
    let result = runtime.block_on(supervise(run_etl(cfg, now), timeout, shutdown_signal()));
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "Xetra ETL job failed");
    }
    result
}

/// `xetra plan`: compute the extract plan without touching source data.
pub fn plan(cfg: &JobConfig) -> Result<PlanReport> {
    let runtime = build_runtime()?;
    let now = Local::now().naive_local();
    let etl = runtime.block_on(build_etl(cfg, now))?;
    let plan = etl.plan();
    Ok(PlanReport {
        extract_date: plan.extract_date,
        dates: plan.dates.clone(),
        meta_update_dates: plan.meta_update_dates(),
    })
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")
}
