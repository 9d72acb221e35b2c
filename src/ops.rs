//! Operation dispatch
//!
//! Runs a validated [`RunPlan`] on a blocking worker thread, streams
//! progress to the caller and records the run in the history file.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{info, warn};

use crate::bench::{ContiguousFiller, ContinuousWriter, FillReport, SweepResult, ThroughputBenchmark};
use crate::config::persistence::{write_performance_table, ResultsStorage};
use crate::config::{Operation, RunPlan};
use crate::io::{create_buffer, create_usage_probe, Buffer, CancellationSignal, UsageProbe};
use crate::models::{PerformanceRecord, RunRecord};
use crate::util::units::{format_bytes, format_size_kb, format_throughput};
use crate::{FtdError, Result};

/// Progress events emitted while an operation runs
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// A sweep over `candidates` buffer sizes has begun
    SweepStarted { candidates: usize },
    /// One sweep candidate finished
    Measured(PerformanceRecord),
    /// Filling began with a buffer of `size_kb`
    FillStarted { size_kb: u64 },
    /// The bounded write loop began with a buffer of `size_kb`
    LoopStarted { size_kb: u64 },
}

/// Executes one operation
pub struct OperationRunner {
    plan: RunPlan,
    signal: CancellationSignal,
    probe: Arc<dyn UsageProbe>,
    history: Option<ResultsStorage>,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl OperationRunner {
    pub fn new(plan: RunPlan, signal: CancellationSignal) -> Self {
        Self {
            plan,
            signal,
            probe: Arc::new(create_usage_probe()),
            history: None,
            progress: None,
        }
    }

    /// Use `probe` instead of the platform probe for the fill phase
    pub fn with_probe(mut self, probe: Arc<dyn UsageProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Append the finished run to `history`
    pub fn with_history(mut self, history: ResultsStorage) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_progress(mut self, progress: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the operation to completion
    pub async fn run(self) -> Result<RunRecord> {
        task::spawn_blocking(move || self.run_blocking())
            .await
            .map_err(|e| FtdError::IoError(std::io::Error::other(e)))?
    }

    fn run_blocking(&self) -> Result<RunRecord> {
        let plan = &self.plan;
        let start = Instant::now();
        let mut record = RunRecord::new(plan.operation.name(), plan.data_path.clone(), plan.fill);

        match plan.operation {
            Operation::Perf => {
                let sweep = self.sweep()?;
                record_sweep(&mut record, &sweep);
                record.bytes_written = last_candidate_bytes(&sweep);
            }
            Operation::Fill => {
                let buffer = create_buffer(plan.size_kb, plan.fill)?;
                let report = self.fill(&buffer)?;
                record_fill(&mut record, &report);
            }
            Operation::PerfFill => {
                let sweep = self.sweep()?;
                record_sweep(&mut record, &sweep);
                match sweep.best_buffer() {
                    Some(buffer) => {
                        let report = self.fill(buffer)?;
                        record_fill(&mut record, &report);
                    }
                    None => warn!("no buffer size produced a measurable rate, skipping fill"),
                }
            }
            Operation::Loop => {
                let buffer = create_buffer(plan.size_kb, plan.fill)?;
                self.notify(ProgressUpdate::LoopStarted {
                    size_kb: plan.size_kb,
                });
                let result = ContinuousWriter::new()
                    .with_cancellation(self.signal.clone())
                    .write_continuously(&buffer, &plan.data_path, plan.duration, plan.iterations)?;
                info!(
                    "{} written in {} iterations at {}",
                    format_bytes(result.bytes_written),
                    result.iterations,
                    format_throughput(result.throughput_mbps())
                );
                record.bytes_written = result.bytes_written;
            }
        }

        record.elapsed = start.elapsed();
        record.timestamp = Utc::now();

        if let Some(history) = &self.history {
            if let Err(e) = history.append_result(record.clone()) {
                warn!("failed to save run history: {}", e);
            }
        }
        Ok(record)
    }

    fn sweep(&self) -> Result<SweepResult> {
        let plan = &self.plan;
        self.notify(ProgressUpdate::SweepStarted {
            candidates: plan.sweep.sizes_kb.len(),
        });

        let sweep = ThroughputBenchmark::new(plan.sweep.clone())
            .with_cancellation(self.signal.clone())
            .run_with_progress(&plan.data_path, plan.fill, |record| {
                self.notify(ProgressUpdate::Measured(record.clone()))
            })?;

        write_performance_table(&sweep.table, &plan.perf_path)?;
        info!("perf_filepath=\"{}\"", plan.perf_path.display());
        Ok(sweep)
    }

    fn fill(&self, buffer: &Buffer) -> Result<FillReport> {
        self.notify(ProgressUpdate::FillStarted {
            size_kb: buffer.size_kb(),
        });
        info!("filling with {} buffer", format_size_kb(buffer.size_kb()));

        let report = ContiguousFiller::new(Arc::clone(&self.probe))
            .with_monitor_interval(self.plan.monitor_interval)
            .fill_contiguously(buffer, &self.plan.data_path, &self.signal)?;

        info!(
            "{} appended to {} in {:?}",
            format_bytes(report.bytes_written),
            display_name(&self.plan.data_path),
            report.elapsed
        );
        Ok(report)
    }

    fn notify(&self, update: ProgressUpdate) {
        if let Some(progress) = &self.progress {
            // receiver may already be gone
            let _ = progress.blocking_send(update);
        }
    }
}

fn record_sweep(record: &mut RunRecord, sweep: &SweepResult) {
    record.table = Some(sweep.table.clone());
    if let Some(best) = &sweep.best {
        record.best_size_kb = Some(best.size_kb);
        record.best_rate_mbps = Some(best.rate_mbps);
    }
}

fn record_fill(record: &mut RunRecord, report: &FillReport) {
    record.fill_outcome = Some(report.outcome.clone());
    record.bytes_written = report.bytes_written;
}

fn last_candidate_bytes(sweep: &SweepResult) -> u64 {
    sweep
        .table
        .records()
        .last()
        .map_or(0, |r| r.size_kb * 1024 * r.iterations)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{FillOutcome, SweepSchedule};
    use crate::config::RunConfig;
    use crate::io::DiskUsage;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Volume whose free space is its capacity minus the data file size
    struct SimulatedVolume {
        capacity: u64,
    }

    impl UsageProbe for SimulatedVolume {
        fn usage(&self, path: &Path) -> io::Result<DiskUsage> {
            let used = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            let free = self.capacity.saturating_sub(used);
            Ok(DiskUsage::from_counts(self.capacity, free, free))
        }
    }

    fn config_in(dir: &Path, operation: &str) -> RunConfig {
        RunConfig::new(operation)
            .with_data_filepath(dir.join("data.dat"))
            .with_perf_filepath(dir.join("perf.csv"))
            .with_sweep(SweepSchedule::new(vec![4, 1, 16], Duration::ZERO, 2))
            .with_monitor_interval_secs(0.01)
    }

    #[tokio::test]
    async fn test_perf_writes_csv_and_history() {
        let temp_dir = tempdir().unwrap();
        let plan = config_in(temp_dir.path(), "perf").into_plan().unwrap();
        let history = ResultsStorage::with_path(temp_dir.path().join("history.json"));

        let record = OperationRunner::new(plan.clone(), CancellationSignal::new())
            .with_history(history)
            .run()
            .await
            .unwrap();

        let csv = fs::read_to_string(&plan.perf_path).unwrap();
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.starts_with(",kb,mb,rate,elapsed,iteration\n"));
        assert_eq!(record.table.as_ref().map(|t| t.len()), Some(3));
        assert!(record.fill_outcome.is_none());

        let saved = ResultsStorage::with_path(temp_dir.path().join("history.json"))
            .load_results()
            .unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].operation, "perf");
    }

    #[tokio::test]
    async fn test_loop_writes_bounded_iterations() {
        let temp_dir = tempdir().unwrap();
        let plan = config_in(temp_dir.path(), "loop")
            .with_size_kb(8)
            .with_duration_secs(0.0)
            .with_iterations(5)
            .into_plan()
            .unwrap();

        let record = OperationRunner::new(plan.clone(), CancellationSignal::new())
            .run()
            .await
            .unwrap();

        assert_eq!(record.bytes_written, 5 * 8 * 1024);
        assert_eq!(fs::metadata(&plan.data_path).unwrap().len(), 5 * 8 * 1024);
        assert!(!plan.perf_path.exists());
    }

    #[tokio::test]
    async fn test_fill_reports_outcome() {
        let temp_dir = tempdir().unwrap();
        let plan = config_in(temp_dir.path(), "fill")
            .with_size_kb(4096)
            .with_fill(0)
            .into_plan()
            .unwrap();
        let probe = Arc::new(SimulatedVolume {
            capacity: 11 * 1024 * 1024,
        });

        let record = OperationRunner::new(plan.clone(), CancellationSignal::new())
            .with_probe(probe)
            .run()
            .await
            .unwrap();

        // 2 full 4 MiB buffers leave 3 MiB, then 2 slices of 1 MiB leave 1 MiB
        assert_eq!(record.fill_outcome, Some(FillOutcome::Completed));
        assert_eq!(record.bytes_written, 10 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_perf_fill_uses_sweep_winner() {
        let temp_dir = tempdir().unwrap();
        let plan = config_in(temp_dir.path(), "perf+fill").into_plan().unwrap();
        let probe = Arc::new(SimulatedVolume {
            capacity: 4 * 1024 * 1024,
        });
        let (tx, mut rx) = mpsc::channel(64);

        let record = OperationRunner::new(plan, CancellationSignal::new())
            .with_probe(probe)
            .with_progress(tx)
            .run()
            .await
            .unwrap();

        let mut measured = 0;
        let mut fill_started = false;
        while let Some(update) = rx.recv().await {
            match update {
                ProgressUpdate::Measured(_) => measured += 1,
                ProgressUpdate::FillStarted { size_kb } => {
                    fill_started = true;
                    assert_eq!(Some(size_kb), record.best_size_kb);
                }
                _ => {}
            }
        }
        assert_eq!(measured, 3);
        assert!(record.best_size_kb.is_some());
        assert!(fill_started);
        assert_eq!(record.fill_outcome, Some(FillOutcome::Completed));
    }

    #[tokio::test]
    async fn test_cancelled_loop_is_a_cancellation_error() {
        let temp_dir = tempdir().unwrap();
        let plan = config_in(temp_dir.path(), "loop")
            .with_iterations(1_000)
            .into_plan()
            .unwrap();
        let signal = CancellationSignal::new();
        signal.cancel();

        let result = OperationRunner::new(plan, signal).run().await;
        assert!(matches!(result, Err(FtdError::CancellationError(_))));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(&PathBuf::from("/tmp/data.dat")), "data.dat");
        assert_eq!(display_name(&PathBuf::from("/")), "/");
    }
}
