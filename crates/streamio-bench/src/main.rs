#![warn(missing_docs)]

//! streamio throughput harness.

mod config;
mod pipeline;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use streamio_core::telemetry::{init_json_tracing, init_tracing};

use crate::config::BenchConfig;
use crate::pipeline::{run_bulk, run_bursts, BulkReport, BurstReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Workload {
    Burst,
    Bulk,
    All,
}

#[derive(Debug, Parser)]
#[command(name = "streamio-bench")]
#[command(about = "Drives streamio ports end to end and prints their statistics", long_about = None)]
struct Cli {
    /// TOML or JSON configuration file.
    #[arg(short, long, env = "STREAMIO_BENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Which workload to run.
    #[arg(short, long, value_enum, default_value = "all")]
    workload: Workload,

    /// Overrides the number of streams.
    #[arg(long)]
    streams: Option<usize>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Default, Serialize)]
struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    burst: Option<BurstReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bulk: Option<BulkReport>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        init_json_tracing(&cli.log_level);
    } else {
        init_tracing(&cli.log_level);
    }

    let mut config = match &cli.config {
        Some(path) => BenchConfig::from_file(path)?,
        None => {
            tracing::info!("No config file given, using defaults");
            BenchConfig::default()
        }
    };
    if let Some(streams) = cli.streams {
        config.streams = streams;
        config.validate()?;
    }

    let mut report = Report::default();
    if matches!(cli.workload, Workload::Burst | Workload::All) {
        report.burst = Some(run_bursts(&config)?);
    }
    if matches!(cli.workload, Workload::Bulk | Workload::All) {
        report.bulk = Some(run_bulk(&config)?);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
