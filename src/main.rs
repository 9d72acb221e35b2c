use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use fill_the_drive::bench::FillOutcome;
use fill_the_drive::config::persistence::ResultsStorage;
use fill_the_drive::config::{parse_log_level, Operation, RunConfig, Settings};
use fill_the_drive::error::{is_cancellation, user_friendly_message};
use fill_the_drive::io::CancellationSignal;
use fill_the_drive::ops::{OperationRunner, ProgressUpdate};
use fill_the_drive::util::units::{format_size_kb, format_throughput};
use fill_the_drive::Result;

#[derive(Debug, Parser)]
#[command(
    name = "fill-the-drive",
    version,
    about = "Find the fastest buffer size for writing to a drive, then fill it up"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,

    #[command(flatten)]
    general: GeneralArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = Operation::Perf.description())]
    Perf,
    #[command(about = Operation::Fill.description())]
    Fill {
        /// Buffer size in kilobytes
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        size: i64,
    },
    #[command(name = "perf+fill", about = Operation::PerfFill.description())]
    PerfFill,
    #[command(about = Operation::Loop.description())]
    Loop {
        /// Buffer size in kilobytes
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        size: i64,
        /// Minimum seconds to keep writing
        #[arg(long, default_value_t = 5.0, allow_negative_numbers = true)]
        duration: f64,
        /// Minimum number of buffer writes
        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        iterations: i64,
    },
}

#[derive(Debug, Args)]
struct GeneralArgs {
    /// Where to dump the file that fills the disk
    #[arg(long, global = true)]
    data_filepath: Option<PathBuf>,

    /// Where to dump the CSV with performance data
    #[arg(long, global = true)]
    perf_filepath: Option<PathBuf>,

    /// Fill byte in 0..=255, -1 for random
    #[arg(long, global = true, allow_negative_numbers = true)]
    fill: Option<i32>,

    /// Log level (trace, debug, info, warning, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Settings file, defaults to the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Don't record this run in the history file
    #[arg(long, global = true)]
    no_history: bool,
}

impl Cli {
    fn operation(&self) -> Operation {
        match self.cmd {
            Commands::Perf => Operation::Perf,
            Commands::Fill { .. } => Operation::Fill,
            Commands::PerfFill => Operation::PerfFill,
            Commands::Loop { .. } => Operation::Loop,
        }
    }

    /// Settings file values overridden by the command line
    fn into_config(self, settings: &Settings) -> RunConfig {
        let mut config = RunConfig::from_settings(self.operation().name(), settings);
        match self.cmd {
            Commands::Fill { size } => config = config.with_size_kb(size),
            Commands::Loop {
                size,
                duration,
                iterations,
            } => {
                config = config
                    .with_size_kb(size)
                    .with_duration_secs(duration)
                    .with_iterations(iterations)
            }
            Commands::Perf | Commands::PerfFill => {}
        }

        let general = self.general;
        if let Some(path) = general.data_filepath {
            config = config.with_data_filepath(path);
        }
        if let Some(path) = general.perf_filepath {
            config = config.with_perf_filepath(path);
        }
        if let Some(fill) = general.fill {
            config = config.with_fill(fill);
        }
        if let Some(level) = general.log_level {
            config = config.with_log_level(level);
        }
        config
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

/// RUST_LOG wins over `level` when set
fn init_tracing(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn spawn_ctrl_c_listener(signal: CancellationSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            signal.cancel();
        }
    });
}

fn progress_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Render progress updates until the runner drops its sender
async fn render_progress(mut rx: mpsc::Receiver<ProgressUpdate>) {
    let mut bar: Option<ProgressBar> = None;
    while let Some(update) = rx.recv().await {
        match update {
            ProgressUpdate::SweepStarted { candidates } => {
                let pb = ProgressBar::new(candidates as u64);
                pb.set_style(progress_style("{spinner} [{bar:30}] {pos}/{len} sizes {msg}"));
                bar = Some(pb);
            }
            ProgressUpdate::Measured(record) => {
                if let Some(pb) = &bar {
                    pb.inc(1);
                    pb.set_message(format!(
                        "{} at {}",
                        format_size_kb(record.size_kb),
                        format_throughput(record.rate_mbps)
                    ));
                }
            }
            ProgressUpdate::FillStarted { size_kb } | ProgressUpdate::LoopStarted { size_kb } => {
                if let Some(pb) = bar.take() {
                    pb.finish();
                }
                let pb = ProgressBar::new_spinner();
                pb.set_style(progress_style("{spinner} {elapsed} {msg}"));
                pb.set_message(format!("writing {} buffers", format_size_kb(size_kb)));
                pb.enable_steady_tick(std::time::Duration::from_millis(200));
                bar = Some(pb);
            }
        }
    }
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let no_history = cli.general.no_history;

    let settings = match load_settings(cli.general.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", user_friendly_message(&e));
            return ExitCode::FAILURE;
        }
    };
    let config = cli.into_config(&settings);
    init_tracing(parse_log_level(&config.log_level).unwrap_or(Level::INFO));

    let operation = config.operation.clone();
    let plan = match config.into_plan() {
        Ok(plan) => plan,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", user_friendly_message(&e));
            return ExitCode::FAILURE;
        }
    };

    let signal = CancellationSignal::new();
    spawn_ctrl_c_listener(signal.clone());

    let mut runner = OperationRunner::new(plan, signal);
    if !no_history {
        match ResultsStorage::new() {
            Ok(storage) => runner = runner.with_history(storage),
            Err(e) => warn!("run history disabled: {}", e),
        }
    }
    let (tx, rx) = mpsc::channel(100);
    let progress = tokio::spawn(render_progress(rx));

    info!("starting {}", operation);
    let result = runner.with_progress(tx).run().await;
    progress.await.ok();

    match result {
        Ok(record) => {
            if let Some(table) = &record.table {
                println!("{}", table);
            }
            println!("{}", record.summary());
            match &record.fill_outcome {
                Some(FillOutcome::Cancelled) => {
                    info!("cancelled");
                    ExitCode::SUCCESS
                }
                Some(FillOutcome::Failed(reason)) => {
                    error!("fill failed: {}", reason);
                    ExitCode::FAILURE
                }
                _ => {
                    info!("done {}", operation);
                    ExitCode::SUCCESS
                }
            }
        }
        Err(e) if is_cancellation(&e) => {
            info!("cancelled");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", user_friendly_message(&e));
            ExitCode::FAILURE
        }
    }
}
