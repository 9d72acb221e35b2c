//! Benchmark result data models
//!
//! Contains the per-size performance records produced by a sweep, the
//! ordered table they are collected into, and the run summaries kept in
//! the history file.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bench::{FillOutcome, WriteResult};
use crate::io::Fill;
use crate::util::units::{calculate_throughput_mbps, format_throughput};

/// Throughput measured for one candidate buffer size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Buffer size in kilobytes
    pub size_kb: u64,
    /// Buffer size in megabytes
    pub size_mb: f64,
    /// Megabytes written per second
    pub rate_mbps: f64,
    /// Seconds spent writing
    pub elapsed_secs: f64,
    /// Buffer writes performed
    pub iterations: u64,
}

impl PerformanceRecord {
    /// Build a record from a bounded write run. A run that took no
    /// measurable time has a rate of zero.
    pub fn from_write(size_kb: u64, result: &WriteResult) -> Self {
        Self {
            size_kb,
            size_mb: size_kb as f64 / 1024.0,
            rate_mbps: calculate_throughput_mbps(result.bytes_written, result.elapsed),
            elapsed_secs: result.elapsed.as_secs_f64(),
            iterations: result.iterations,
        }
    }
}

/// Performance records in the order they were measured
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceTable {
    records: Vec<PerformanceRecord>,
}

impl PerformanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PerformanceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[PerformanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Row with the highest rate. Ties go to the earlier row, and rows at
    /// 0 MB/s never win.
    pub fn fastest(&self) -> Option<&PerformanceRecord> {
        let mut best: Option<&PerformanceRecord> = None;
        for record in &self.records {
            let best_rate = best.map_or(0.0, |b| b.rate_mbps);
            if record.rate_mbps > best_rate {
                best = Some(record);
            }
        }
        best
    }

    /// Render as CSV with a leading row index column
    pub fn to_csv(&self) -> String {
        let mut csv = String::from(",kb,mb,rate,elapsed,iteration\n");
        for (index, record) in self.records.iter().enumerate() {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                index,
                record.size_kb,
                record.size_mb,
                record.rate_mbps,
                record.elapsed_secs,
                record.iterations
            ));
        }
        csv
    }
}

impl fmt::Display for PerformanceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4} {:>10} {:>12} {:>14} {:>10} {:>10}",
            "", "kb", "mb", "rate", "elapsed", "iteration"
        )?;
        for (index, record) in self.records.iter().enumerate() {
            writeln!(
                f,
                "{:>4} {:>10} {:>12.6} {:>14} {:>10.3} {:>10}",
                index,
                record.size_kb,
                record.size_mb,
                format_throughput(record.rate_mbps),
                record.elapsed_secs,
                record.iterations
            )?;
        }
        Ok(())
    }
}

/// Summary of one invocation, kept in the run history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// When the operation finished
    pub timestamp: DateTime<Utc>,
    /// Operation name as given on the command line
    pub operation: String,
    pub data_path: PathBuf,
    pub fill: Fill,
    /// Sweep table, for operations that ran a sweep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<PerformanceTable>,
    /// Winning buffer size of the sweep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_size_kb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_rate_mbps: Option<f64>,
    /// Fill result, for operations that filled the drive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_outcome: Option<FillOutcome>,
    /// Bytes written by the final write phase
    pub bytes_written: u64,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl RunRecord {
    pub fn new(operation: impl Into<String>, data_path: PathBuf, fill: Fill) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            data_path,
            fill,
            table: None,
            best_size_kb: None,
            best_rate_mbps: None,
            fill_outcome: None,
            bytes_written: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Get a human-readable summary of the run
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} - {} - {} written in {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            crate::util::units::format_bytes(self.bytes_written),
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64)),
        );
        if let (Some(kb), Some(rate)) = (self.best_size_kb, self.best_rate_mbps) {
            summary.push_str(&format!(" - sweetspot {} kb at {}", kb, format_throughput(rate)));
        }
        if let Some(outcome) = &self.fill_outcome {
            summary.push_str(&format!(" - fill {:?}", outcome));
        }
        summary
    }
}

// Custom serde module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_nanos().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u128::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}
