//! Configuration management module
//!
//! Handles the persisted settings file, validation of run parameters and
//! the typed plan an operation is executed from.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, Level};

use crate::bench::SweepSchedule;
use crate::io::{buffer_len, Fill};
use crate::{FtdError, Result, APP_NAME, CONFIG_FILE};

pub mod persistence;

pub const DEFAULT_FILL: i32 = Fill::RANDOM_SENTINEL;
pub const DEFAULT_SIZE_KB: i64 = 1;
pub const DEFAULT_DURATION_SECS: f64 = 5.0;
pub const DEFAULT_ITERATIONS: i64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Operation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Throughput sweep only
    Perf,
    /// Fill the drive with a buffer of a given size
    Fill,
    /// Sweep, then fill with the fastest buffer
    PerfFill,
    /// Bounded continuous writes of one buffer
    Loop,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Perf,
        Operation::Fill,
        Operation::PerfFill,
        Operation::Loop,
    ];

    /// Name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Perf => "perf",
            Operation::Fill => "fill",
            Operation::PerfFill => "perf+fill",
            Operation::Loop => "loop",
        }
    }

    /// Whether the operation runs the throughput sweep
    pub fn runs_sweep(&self) -> bool {
        matches!(self, Operation::Perf | Operation::PerfFill)
    }

    /// Get a human-readable description of the operation
    pub fn description(&self) -> &'static str {
        match self {
            Operation::Perf => "find the buffer size that is fastest to write",
            Operation::Fill => "fill up the disk",
            Operation::PerfFill => "find the fastest buffer size, then fill up the disk with it",
            Operation::Loop => "repeatedly write to the disk for some size and duration",
        }
    }
}

impl FromStr for Operation {
    type Err = FtdError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Operation::ALL.iter().map(Operation::name).collect();
                FtdError::ConfigError(format!(
                    "operation {:?} does not exist, use one of {:?}",
                    s, names
                ))
            })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a log level name. Accepts the tracing names plus `warning`
/// and `critical`.
pub fn parse_log_level(name: &str) -> Result<Level> {
    match name.to_ascii_lowercase().as_str() {
        "warning" => Ok(Level::WARN),
        "critical" | "fatal" => Ok(Level::ERROR),
        other => Level::from_str(other).map_err(|_| {
            FtdError::ConfigError(format!("log_level {:?} does not exist", name))
        }),
    }
}

/// Defaults persisted in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where to dump the file that fills the disk
    pub data_filepath: PathBuf,
    /// Where to dump the CSV with performance data
    pub perf_filepath: PathBuf,
    /// Fill byte, -1 for random
    pub fill: i32,
    pub log_level: String,
    /// Seconds between disk usage samples while filling
    pub monitor_interval_secs: f64,
    /// Candidate sizes and bounds for the throughput sweep
    pub sweep: SweepSchedule,
}

impl Default for Settings {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir();
        Self {
            data_filepath: temp_dir.join("data.dat"),
            perf_filepath: temp_dir.join("perf.csv"),
            fill: DEFAULT_FILL,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            monitor_interval_secs: 1.0,
            sweep: SweepSchedule::default(),
        }
    }
}

impl Settings {
    /// Load settings from the standard config file location.
    /// Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_or_default(Self::config_file_path().ok())
    }

    /// Load settings from `path`, or defaults when there is no path to
    /// load from
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("no config directory, using default settings");
                Ok(Self::default())
            }
        }
    }

    /// Load settings from `path`, returning defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            FtdError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            FtdError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/fill-the-drive/fill-the-drive.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            FtdError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

/// Unvalidated run parameters as given by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub operation: String,
    /// Fill byte, -1 for random
    pub fill: i32,
    /// Buffer size in kilobytes for `fill` and `loop`
    pub size_kb: i64,
    /// Time bound for `loop`, in seconds
    pub duration_secs: f64,
    /// Iteration bound for `loop`
    pub iterations: i64,
    pub data_filepath: PathBuf,
    pub perf_filepath: PathBuf,
    pub log_level: String,
    pub sweep: SweepSchedule,
    pub monitor_interval_secs: f64,
}

impl RunConfig {
    /// Create a run configuration with default values
    pub fn new(operation: impl Into<String>) -> Self {
        Self::from_settings(operation, &Settings::default())
    }

    /// Create a run configuration whose defaults come from `settings`
    pub fn from_settings(operation: impl Into<String>, settings: &Settings) -> Self {
        Self {
            operation: operation.into(),
            fill: settings.fill,
            size_kb: DEFAULT_SIZE_KB,
            duration_secs: DEFAULT_DURATION_SECS,
            iterations: DEFAULT_ITERATIONS,
            data_filepath: settings.data_filepath.clone(),
            perf_filepath: settings.perf_filepath.clone(),
            log_level: settings.log_level.clone(),
            sweep: settings.sweep.clone(),
            monitor_interval_secs: settings.monitor_interval_secs,
        }
    }

    pub fn with_fill(mut self, fill: i32) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_size_kb(mut self, size_kb: i64) -> Self {
        self.size_kb = size_kb;
        self
    }

    pub fn with_duration_secs(mut self, duration_secs: f64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_iterations(mut self, iterations: i64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_data_filepath(mut self, path: PathBuf) -> Self {
        self.data_filepath = path;
        self
    }

    pub fn with_perf_filepath(mut self, path: PathBuf) -> Self {
        self.perf_filepath = path;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_sweep(mut self, sweep: SweepSchedule) -> Self {
        self.sweep = sweep;
        self
    }

    pub fn with_monitor_interval_secs(mut self, secs: f64) -> Self {
        self.monitor_interval_secs = secs;
        self
    }

    /// Validate the parameters without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        let operation: Operation = self.operation.parse()?;
        parse_log_level(&self.log_level)?;

        if self.size_kb < 1 {
            return Err(FtdError::ConfigError(format!(
                "size must be a positive number of kilobytes, got {}",
                self.size_kb
            )));
        }

        buffer_len(self.size_kb as u64)?;
        Fill::from_raw(self.fill)?;

        seconds("duration", self.duration_secs)?;

        if self.iterations < 0 {
            return Err(FtdError::ConfigError(format!(
                "iterations must be a non-negative count, got {}",
                self.iterations
            )));
        }

        seconds("monitor interval", self.monitor_interval_secs)?;

        if operation.runs_sweep() {
            self.sweep.validate()?;
        }

        Ok(())
    }

    /// Validate, create the output directories and produce the typed plan
    pub fn into_plan(self) -> Result<RunPlan> {
        self.validate()?;

        for path in [&self.data_filepath, &self.perf_filepath] {
            ensure_parent_dir(path)?;
        }

        Ok(RunPlan {
            operation: self.operation.parse()?,
            fill: Fill::from_raw(self.fill)?,
            size_kb: self.size_kb as u64,
            duration: seconds("duration", self.duration_secs)?,
            iterations: self.iterations as u64,
            data_path: self.data_filepath,
            perf_path: self.perf_filepath,
            log_level: parse_log_level(&self.log_level)?,
            sweep: self.sweep,
            monitor_interval: seconds("monitor interval", self.monitor_interval_secs)?,
        })
    }
}

/// Convert a user supplied number of seconds into a duration
fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        FtdError::ConfigError(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, secs
        ))
    })
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            fs::create_dir_all(parent).map_err(|e| {
                FtdError::PathError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })
        }
        _ => Ok(()),
    }
}

/// Validated, immutable parameters of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub operation: Operation,
    pub fill: Fill,
    pub size_kb: u64,
    pub duration: Duration,
    pub iterations: u64,
    pub data_path: PathBuf,
    pub perf_path: PathBuf,
    pub log_level: Level,
    pub sweep: SweepSchedule,
    pub monitor_interval: Duration,
}
