//! Fleet-Harvest main entry point
//!
//! This is the command-line interface for the Fleet-Harvest extraction pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleet_harvest::config::{load_config_with_hash, validate, write_config, Config};
use fleet_harvest::output::{
    load_statistics, print_merge_report, print_plan, print_run_report, print_statistics,
};
use fleet_harvest::shutdown::shutdown_signal;
use fleet_harvest::storage::{merge_sinks, SqliteSink, DEFAULT_MERGE_CHUNK};
use fleet_harvest::supervisor::{plan_run, ProcessLauncher, Supervisor};
use fleet_harvest::worker::{run_worker_process, WorkerExit, WorkerRange};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Fleet-Harvest: a resilient, partitioned record extraction pipeline
///
/// Fleet-Harvest splits an identifier range across worker processes, extracts
/// one record per identifier from the remote source and keeps going through
/// network outages, session crashes and worker deaths.
#[derive(Parser, Debug)]
#[command(name = "fleet-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resilient, partitioned record extraction pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Partition the range and supervise one worker process per partition
    Run(RunOverrides),

    /// Walk a single range (launched by `run`)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        worker_id: u32,

        /// First identifier (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        start: i64,

        /// Last identifier (exclusive)
        #[arg(long, allow_hyphen_values = true)]
        end: i64,

        /// SQLite sink this worker writes to
        #[arg(long)]
        sink: PathBuf,
    },

    /// Merge the existing worker sinks into the merged sink and exit
    Merge,

    /// Show statistics of a sink and exit
    Stats {
        /// Sink to inspect (defaults to the merged sink)
        #[arg(long)]
        sink: Option<PathBuf>,
    },

    /// Validate config and show partitions and resume points without running
    DryRun,
}

/// Command-line overrides of the `run` command
#[derive(clap::Args, Debug, Default)]
struct RunOverrides {
    /// Number of worker processes
    #[arg(long)]
    workers: Option<u32>,

    /// First identifier of the range (inclusive)
    #[arg(long, allow_hyphen_values = true)]
    start: Option<i64>,

    /// Last identifier of the range (exclusive)
    #[arg(long, allow_hyphen_values = true)]
    end: Option<i64>,

    /// Minimum points for a record to be kept
    #[arg(long)]
    points_threshold: Option<i64>,

    /// Identifiers between scheduled session recycles
    #[arg(long)]
    recycle_interval: Option<u32>,

    /// Merge worker sinks when the run ends
    #[arg(long)]
    merge: bool,

    /// Restart workers that die before finishing
    #[arg(long)]
    monitor: bool,

    /// Restarts allowed per worker
    #[arg(long)]
    max_restarts: Option<u32>,
}

impl RunOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(start) = self.start {
            config.pipeline.start = start;
        }
        if let Some(end) = self.end {
            config.pipeline.end = end;
        }
        if let Some(threshold) = self.points_threshold {
            config.pipeline.points_threshold = threshold;
        }
        if let Some(interval) = self.recycle_interval {
            config.pipeline.session_recycle_interval = interval;
        }
        if self.merge {
            config.supervisor.merge_on_completion = true;
        }
        if self.monitor {
            config.supervisor.monitor = true;
        }
        if let Some(max_restarts) = self.max_restarts {
            config.supervisor.max_restarts = max_restarts;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::debug!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    match &cli.command {
        Command::Run(overrides) => handle_run(config, &config_hash, overrides, &cli).await,
        Command::Worker {
            worker_id,
            start,
            end,
            sink,
        } => {
            let range = WorkerRange {
                worker_id: *worker_id,
                start_identifier: *start,
                end_identifier: *end,
                direction: config.pipeline.direction,
                sink_location: sink.clone(),
            };
            handle_worker(config, range).await
        }
        Command::Merge => handle_merge(&config),
        Command::Stats { sink } => handle_stats(&config, sink.as_ref()),
        Command::DryRun => handle_dry_run(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("fleet_harvest=info,warn"),
            1 => EnvFilter::new("fleet_harvest=debug,info"),
            2 => EnvFilter::new("fleet_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Verbosity flags handed down to worker processes
fn verbosity_args(verbose: u8, quiet: bool) -> Vec<String> {
    if quiet {
        vec!["-q".to_string()]
    } else if verbose > 0 {
        vec![format!("-{}", "v".repeat(usize::from(verbose)))]
    } else {
        Vec::new()
    }
}

/// Handles the `run` command: supervises workers until they finish or a signal arrives
async fn handle_run(
    mut config: Config,
    config_hash: &str,
    overrides: &RunOverrides,
    cli: &Cli,
) -> anyhow::Result<ExitCode> {
    overrides.apply(&mut config);
    validate(&config).context("Invalid configuration after command-line overrides")?;

    // Workers read the effective configuration, overrides included
    let run_config = config.output.run_config_path();
    write_config(&config, &run_config)
        .with_context(|| format!("Failed to write {}", run_config.display()))?;

    tracing::info!(
        "Harvesting [{}, {}) {} with {} workers (config hash: {})",
        config.pipeline.start,
        config.pipeline.end,
        config.pipeline.direction.as_str(),
        config.pipeline.workers,
        &config_hash[..12.min(config_hash.len())]
    );

    let launcher = ProcessLauncher::current_exe(run_config)?
        .with_global_args(verbosity_args(cli.verbose, cli.quiet));
    let mut supervisor = Supervisor::new(&config, launcher)?;
    let report = supervisor.run_until(shutdown_signal()).await?;

    print_run_report(&report);

    if report.unfinished.is_empty() || report.interrupted {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Handles the hidden `worker` command
async fn handle_worker(config: Config, range: WorkerRange) -> anyhow::Result<ExitCode> {
    let worker_id = range.worker_id;

    match run_worker_process(config, range).await {
        Ok(WorkerExit::Completed(stats)) => {
            tracing::info!(
                "Worker {} done: {} processed, {} persisted",
                worker_id,
                stats.processed,
                stats.persisted
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(WorkerExit::Interrupted(_)) => Ok(ExitCode::from(130)),
        Err(e) => Err(e).with_context(|| format!("Worker {} failed", worker_id)),
    }
}

/// Handles the `merge` command
fn handle_merge(config: &Config) -> anyhow::Result<ExitCode> {
    let sources = config.output.sink_paths(config.pipeline.workers);
    tracing::info!(
        "Merging {} sinks into {}",
        sources.len(),
        config.output.merged_path.display()
    );

    let report = merge_sinks(&sources, &config.output.merged_path, DEFAULT_MERGE_CHUNK)?;
    print_merge_report(&report);
    Ok(ExitCode::SUCCESS)
}

/// Handles the `stats` command
fn handle_stats(config: &Config, sink: Option<&PathBuf>) -> anyhow::Result<ExitCode> {
    let path = sink.unwrap_or(&config.output.merged_path);
    println!("Sink: {}\n", path.display());

    let sink = SqliteSink::open_existing(path)
        .with_context(|| format!("Cannot open sink {}", path.display()))?;
    let stats = load_statistics(&sink)?;
    print_statistics(&stats);

    Ok(ExitCode::SUCCESS)
}

/// Handles the `dry-run` command: validates config and shows what would run
fn handle_dry_run(config: &Config) -> anyhow::Result<ExitCode> {
    println!("=== Fleet-Harvest Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url);
    println!(
        "  Record URL: {}",
        config.source.record_url(config.pipeline.start)?
    );
    println!("  Export selector: {}", config.source.export_selector);

    println!("\nPipeline:");
    println!(
        "  Range: [{}, {}) {}",
        config.pipeline.start,
        config.pipeline.end,
        config.pipeline.direction.as_str()
    );
    println!("  Workers: {}", config.pipeline.workers);
    println!("  Points threshold: {}", config.pipeline.points_threshold);
    println!(
        "  Session recycle interval: {}",
        config.pipeline.session_recycle_interval
    );
    println!(
        "  Checkpoint interval: {}",
        config.pipeline.checkpoint_interval
    );

    println!("\nSupervisor:");
    println!("  Monitor: {}", config.supervisor.monitor);
    println!("  Max restarts: {}", config.supervisor.max_restarts);
    println!("  Merge on completion: {}", config.supervisor.merge_on_completion);

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir.display());
    println!("  Merged sink: {}", config.output.merged_path.display());
    println!();

    let plan = plan_run(config)?;
    print_plan(&plan);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would launch {} workers",
        plan.iter().filter(|(_, point)| point.start().is_some()).count()
    );

    Ok(ExitCode::SUCCESS)
}
