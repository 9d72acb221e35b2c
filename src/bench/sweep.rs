//! Buffer size throughput sweep
//!
//! Measures write throughput for a schedule of candidate buffer sizes and
//! keeps the fastest buffer for a subsequent fill.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::continuous::ContinuousWriter;
use crate::io::{buffer_len, create_buffer, Buffer, CancellationSignal, Fill};
use crate::models::{PerformanceRecord, PerformanceTable};
use crate::{FtdError, Result};

/// Candidate sizes and the per-candidate write bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSchedule {
    /// Candidate buffer sizes in kilobytes
    pub sizes_kb: Vec<u64>,
    /// Minimum seconds spent writing each candidate
    pub duration_secs: f64,
    /// Minimum writes per candidate
    pub iterations: u64,
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            sizes_kb: default_sizes_kb(),
            duration_secs: 5.0,
            iterations: 10,
        }
    }
}

impl SweepSchedule {
    pub fn new(sizes_kb: Vec<u64>, duration: Duration, iterations: u64) -> Self {
        Self {
            sizes_kb,
            duration_secs: duration.as_secs_f64(),
            iterations,
        }
    }

    /// Per-candidate time bound, zero if `duration_secs` is not a valid duration
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or(Duration::ZERO)
    }

    /// Candidate sizes in the order they are measured
    pub fn sorted_sizes(&self) -> Vec<u64> {
        let mut sizes = self.sizes_kb.clone();
        sizes.sort_unstable();
        sizes
    }

    pub fn validate(&self) -> Result<()> {
        if self.sizes_kb.is_empty() {
            return Err(FtdError::ConfigError(
                "sweep schedule needs at least one size".to_string(),
            ));
        }
        if self.sizes_kb.contains(&0) {
            return Err(FtdError::ConfigError(
                "sweep sizes must be positive kilobyte counts".to_string(),
            ));
        }
        for &size_kb in &self.sizes_kb {
            buffer_len(size_kb)?;
        }
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            return Err(FtdError::ConfigError(format!(
                "sweep duration must be a non-negative number of seconds, got {}",
                self.duration_secs
            )));
        }
        Ok(())
    }
}

/// Base sizes {1, 4, 32, 128} KB, the same scaled to MB, then x2 and x3 of
/// everything so far, ascending. Duplicates are kept.
pub fn default_sizes_kb() -> Vec<u64> {
    let mut sizes: Vec<u64> = vec![1, 4, 32, 128];
    let megabytes: Vec<u64> = sizes.iter().map(|kb| kb * 1024).collect();
    sizes.extend(megabytes);
    let doubled: Vec<u64> = sizes.iter().map(|kb| kb * 2).collect();
    let tripled: Vec<u64> = sizes.iter().map(|kb| kb * 3).collect();
    sizes.extend(doubled);
    sizes.extend(tripled);
    sizes.sort_unstable();
    sizes
}

/// Winning candidate of a sweep
#[derive(Debug, Clone)]
pub struct BestCandidate {
    pub size_kb: u64,
    pub rate_mbps: f64,
    pub buffer: Buffer,
}

/// Result of a sweep
#[derive(Debug, Clone)]
pub struct SweepResult {
    /// Fastest candidate, `None` if no candidate measured above 0 MB/s
    pub best: Option<BestCandidate>,
    pub table: PerformanceTable,
}

impl SweepResult {
    pub fn best_buffer(&self) -> Option<&Buffer> {
        self.best.as_ref().map(|best| &best.buffer)
    }
}

/// Throughput sweep over a [`SweepSchedule`]
#[derive(Debug, Clone, Default)]
pub struct ThroughputBenchmark {
    schedule: SweepSchedule,
    writer: ContinuousWriter,
}

impl ThroughputBenchmark {
    pub fn new(schedule: SweepSchedule) -> Self {
        Self {
            schedule,
            writer: ContinuousWriter::new(),
        }
    }

    /// Stop between writes once `signal` is raised
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.writer = self.writer.with_cancellation(signal);
        self
    }

    pub fn schedule(&self) -> &SweepSchedule {
        &self.schedule
    }

    /// Measure every candidate size against `path`
    pub fn run(&self, path: &Path, fill: Fill) -> Result<SweepResult> {
        self.run_with_progress(path, fill, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_record` after each candidate
    pub fn run_with_progress<F>(&self, path: &Path, fill: Fill, mut on_record: F) -> Result<SweepResult>
    where
        F: FnMut(&PerformanceRecord),
    {
        self.schedule.validate()?;
        info!("data_filepath=\"{}\", fill={}", path.display(), fill);

        let duration = self.schedule.duration();
        let mut table = PerformanceTable::new();
        let mut best: Option<BestCandidate> = None;

        for size_kb in self.schedule.sorted_sizes() {
            let buffer = create_buffer(size_kb, fill)?;
            let result =
                self.writer
                    .write_continuously(&buffer, path, duration, self.schedule.iterations)?;

            let record = PerformanceRecord::from_write(size_kb, &result);
            info!(
                "{} kb - {:.3} mb - {:.3} mb/s over {:.3} sec - iteration {}",
                record.size_kb, record.size_mb, record.rate_mbps, record.elapsed_secs, record.iterations
            );

            let best_rate = best.as_ref().map_or(0.0, |b| b.rate_mbps);
            if record.rate_mbps > best_rate {
                best = Some(BestCandidate {
                    size_kb,
                    rate_mbps: record.rate_mbps,
                    buffer,
                });
            }

            on_record(&record);
            table.push(record);
        }

        debug!("\n{}", table);
        match &best {
            Some(winner) => info!(
                "{} kb - {:.3} mb/s - sweetspot",
                winner.size_kb, winner.rate_mbps
            ),
            None => info!("no candidate produced a measurable rate"),
        }

        Ok(SweepResult { best, table })
    }
}
