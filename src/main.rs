use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cement_hydration_sim::io::params;
use cement_hydration_sim::{run_simulation, OutputPaths};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "3-D cellular-automaton simulator of Portland cement hydration"
)]
struct Cli {
    /// Progress JSON file, rewritten every 10 cycles.
    #[arg(long, value_name = "FILE")]
    json: PathBuf,

    /// Work directory: all auxiliary inputs are read from here and every
    /// output is written here.
    #[arg(long, value_name = "DIR")]
    workdir: PathBuf,

    /// Ordered key,value parameter file.
    #[arg(long, value_name = "FILE")]
    parameters: PathBuf,

    #[arg(short, long, conflicts_with_all = ["quiet", "silent"])]
    verbose: bool,

    #[arg(short, long, conflicts_with = "silent")]
    quiet: bool,

    #[arg(short, long)]
    silent: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let start = Instant::now();

    let level = if cli.silent {
        "error"
    } else if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // The log file is named after the run's output base; peek at it here so
    // the pipeline's own diagnostics are captured from the first line.
    let base = params::peek_output_base(&cli.parameters).unwrap_or_else(|| "run".to_string());
    let log_path = OutputPaths::new(&cli.workdir, &base).log_file();
    let log_file = File::create(&log_path)
        .with_context(|| format!("could not create log file {:?}", log_path))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .init();

    let summary = run_simulation(&cli.workdir, &cli.parameters, &cli.json)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    tracing::info!(elapsed = ?start.elapsed(), "done");
    Ok(())
}
