//! Xetra daily report batch job.
//!
//! Launched once per schedule by the container runtime. Exit status tells the
//! orchestrator whether the run succeeded (see `xetra::exit_codes`).

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use xetra::exit_codes;
use xetra::io::config::{JobConfig, load_config};
use xetra::{job, logging};

#[derive(Parser)]
#[command(name = "xetra", version, about = "Xetra daily report ETL job")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the report 1 ETL once.
    Run {
        /// Job configuration (TOML).
        #[arg(env = "XETRA_CONFIG")]
        config: PathBuf,
    },
    /// Print the dates the next run would extract; reads only the meta file.
    Plan {
        #[arg(env = "XETRA_CONFIG")]
        config: PathBuf,
        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Load and validate the configuration, then exit.
    Check {
        #[arg(env = "XETRA_CONFIG")]
        config: PathBuf,
    },
}

impl Command {
    fn config_path(&self) -> &Path {
        match self {
            Command::Run { config } | Command::Plan { config, .. } | Command::Check { config } => {
                config
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli.command));
}

fn run(command: Command) -> i32 {
    let path = command.config_path().to_path_buf();
    let cfg = match load_config(&path) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{:#}", err);
            return exit_codes::INVALID;
        }
    };
    if let Err(err) = logging::init(&cfg.logging) {
        eprintln!("{:#}", err);
        return exit_codes::INVALID;
    }

    match dispatch(command, &path, &cfg) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::FAILED
        }
    }
}

fn dispatch(command: Command, path: &Path, cfg: &JobConfig) -> Result<i32> {
    match command {
        Command::Run { .. } => {
            let outcome = job::run(cfg)?;
            if let job::JobOutcome::Completed(done) = &outcome {
                println!(
                    "run: extract_date={} processed_dates={} report_rows={} target_key={}",
                    done.extract_date
                        .map_or_else(|| "none".to_string(), |d| d.to_string()),
                    done.processed_dates.len(),
                    done.report_rows,
                    done.target_key.as_deref().unwrap_or("none"),
                );
            }
            Ok(outcome.exit_code())
        }
        Command::Plan { json, .. } => {
            let plan = job::plan(cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                match (plan.extract_date, plan.dates.first(), plan.dates.last()) {
                    (Some(extract_date), Some(first), Some(last)) => println!(
                        "plan: extract_date={} dates={} range={}..={}",
                        extract_date,
                        plan.dates.len(),
                        first,
                        last
                    ),
                    _ => println!("plan: nothing to process"),
                }
            }
            Ok(exit_codes::OK)
        }
        Command::Check { .. } => {
            println!("check: {} ok", path.display());
            Ok(exit_codes::OK)
        }
    }
}
