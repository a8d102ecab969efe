//! `scalekit` -- scaling-test orchestrator.
//!
//! # Commands
//!
//! - `scalekit run <workload.json> <host> <mode> [maxnodes] [minnodes]`
//!   runs a sweep (or, with `--manual`, only submits it).
//! - `scalekit collect <run-id>` collects the jobs of an earlier run.
//! - `scalekit fit <dataset.json>` fits scaling curves to a dataset.
//!
//! Tunables are read from the environment (and a `.env` file); see
//! [`OrchestratorConfig::from_env`].

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scalekit_core::fitting::{
    fit_dataset, Extrapolation, FitOptions, FitSet, MemoryExtrapolation, TimingExtrapolation,
};
use scalekit_core::grid::{GridConfig, Spacing};
use scalekit_core::host::HostRegistry;
use scalekit_core::point::ParallelizationMode;
use scalekit_core::workload::Workload;
use scalekit_orchestrator::output::{read_dataset, write_outcome, FITS_FILE};
use scalekit_orchestrator::{
    ExecutionContext, Orchestrator, OrchestratorConfig, SweepOptions, SweepOutcome,
};
use scalekit_remote::LocalBackend;

#[derive(Parser)]
#[command(name = "scalekit", version, about = "Run and analyse parallel scaling tests")]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scaling test.
    Run(RunArgs),
    /// Collect the jobs of an earlier run.
    Collect(CollectArgs),
    /// Fit scaling curves to a dataset.
    Fit(FitArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Workload descriptor (JSON).
    workload: PathBuf,
    /// Host id from the host registry.
    host: String,
    /// mpi, hybrid, or threads.
    mode: ParallelizationMode,
    #[arg(default_value_t = 1.0)]
    maxnodes: f64,
    #[arg(default_value_t = 0.0)]
    minnodes: f64,
    /// doubling or linear.
    #[arg(long, default_value = "doubling")]
    spacing: Spacing,
    #[arg(long, default_value_t = 1)]
    repeats: u32,
    /// Submit only; collect later with `scalekit collect`.
    #[arg(long)]
    manual: bool,
    /// Keep job output on the host.
    #[arg(long)]
    keep: bool,
    /// Export per-job progress records.
    #[arg(long)]
    progress: bool,
    /// Export per-job timeline records.
    #[arg(long)]
    timeline: bool,
    /// Weak scaling: grow the package count with the core count.
    #[arg(long)]
    weak: bool,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CollectArgs {
    run_id: String,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    keep: bool,
}

#[derive(Args)]
struct FitArgs {
    dataset: PathBuf,
    #[arg(long, default_value_t = 1.0)]
    sigma_level: f64,
    /// Use the process count as abscissa.
    #[arg(long)]
    hybridisation: bool,
    /// Allow mixed workload sizes.
    #[arg(long)]
    hetero: bool,
    /// Fit each communication step separately.
    #[arg(long)]
    split_communication: bool,
    /// Extrapolate timing to one core.
    #[arg(long)]
    ncores: bool,
    #[arg(long)]
    npackages: bool,
    #[arg(long)]
    nwavelengths: bool,
    /// Show the extrapolated serial time as a data point.
    #[arg(long)]
    in_times: bool,
    /// Extrapolate memory to one process.
    #[arg(long)]
    nprocesses: bool,
    #[arg(long)]
    memory_nwavelengths: bool,
    #[arg(long)]
    ncells: bool,
    /// Show the extrapolated serial memory as a data point.
    #[arg(long)]
    in_memory: bool,
    #[arg(long)]
    output: Option<PathBuf>,
}

impl FitArgs {
    fn options(&self) -> FitOptions {
        FitOptions {
            sigma_level: self.sigma_level,
            hybridisation: self.hybridisation,
            hetero: self.hetero,
            split_communication: self.split_communication,
            extrapolation: Extrapolation {
                timing: TimingExtrapolation {
                    ncores: self.ncores,
                    npackages: self.npackages,
                    nwavelengths: self.nwavelengths,
                    in_times: self.in_times,
                },
                memory: MemoryExtrapolation {
                    nprocesses: self.nprocesses,
                    nwavelengths: self.memory_nwavelengths,
                    ncells: self.ncells,
                    in_memory: self.in_memory,
                },
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.debug { "scalekit=debug" } else { "scalekit=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match dispatch(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("scalekit failed: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn dispatch(command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Run(args) => run(args).await,
        Command::Collect(args) => collect(args).await,
        Command::Fit(args) => fit(args),
    }
}

fn load_environment() -> anyhow::Result<(OrchestratorConfig, HostRegistry)> {
    let config = OrchestratorConfig::from_env()?;
    let hosts = HostRegistry::load(&config.hosts_file)
        .with_context(|| format!("loading hosts from {}", config.hosts_file.display()))?;
    Ok((config, hosts))
}

/// Cancel `ctx` on Ctrl-C. Remote jobs keep running.
fn cancel_on_ctrl_c(ctx: &ExecutionContext) {
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current polls; job records are kept");
            cancel.cancel();
        }
    });
}

async fn run(args: RunArgs) -> anyhow::Result<bool> {
    let (config, hosts) = load_environment()?;
    let workload = Workload::load(&args.workload)
        .with_context(|| format!("loading workload {}", args.workload.display()))?;

    let grid = GridConfig::new(args.mode, args.minnodes, args.maxnodes).with_spacing(args.spacing);
    let mut options = SweepOptions::new(workload, args.host, grid);
    options.repeats = args.repeats;
    options.manual = args.manual;
    options.keep_output = args.keep;
    options.progress = args.progress;
    options.timeline = args.timeline;
    options.weak = args.weak;

    let ctx = ExecutionContext::new(hosts, config);
    cancel_on_ctrl_c(&ctx);
    let orchestrator = Orchestrator::new(ctx, Arc::new(LocalBackend::new()));

    let outcome = orchestrator.run(&options).await?;
    finish(outcome, args.output)
}

async fn collect(args: CollectArgs) -> anyhow::Result<bool> {
    let (config, hosts) = load_environment()?;
    let ctx = ExecutionContext::resume(args.run_id, hosts, config);
    cancel_on_ctrl_c(&ctx);
    let orchestrator = Orchestrator::new(ctx, Arc::new(LocalBackend::new()));

    let outcome = orchestrator.collect(args.keep.then_some(true)).await?;
    finish(outcome, args.output)
}

/// Fit the dataset of a finished sweep, write every output, and print
/// the report.
fn finish(mut outcome: SweepOutcome, output: Option<PathBuf>) -> anyhow::Result<bool> {
    let fits = if outcome.report.manual || outcome.dataset.is_empty() {
        None
    } else {
        let options = FitOptions {
            hetero: outcome.options.weak,
            ..FitOptions::default()
        };
        match fit_dataset(&outcome.dataset, &options) {
            Ok(fits) => Some(fits),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping fits");
                None
            }
        }
    };
    if let Some(fits) = &fits {
        outcome.report.skipped_fits = fits.skipped.clone();
    }

    let dir = output.unwrap_or_else(|| PathBuf::from(&outcome.run_id));
    write_outcome(&dir, &outcome, fits.as_ref())
        .with_context(|| format!("writing output to {}", dir.display()))?;

    print!("{}", outcome.report);
    Ok(outcome.report.is_success())
}

fn fit(args: FitArgs) -> anyhow::Result<bool> {
    let dataset = read_dataset(&args.dataset)
        .with_context(|| format!("reading dataset {}", args.dataset.display()))?;
    let fits: FitSet = fit_dataset(&dataset, &args.options())?;

    for fit in &fits.fits {
        println!("{fit}");
    }
    for skipped in &fits.skipped {
        println!("skipped: {skipped}");
    }

    let dir = args
        .output
        .clone()
        .unwrap_or_else(|| args.dataset.parent().map(Path::to_path_buf).unwrap_or_default());
    let path = dir.join(FITS_FILE);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, serde_json::to_vec_pretty(&fits)?)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "Wrote fits");
    Ok(!fits.fits.is_empty())
}
