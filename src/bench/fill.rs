//! Contiguous drive filler
//!
//! Appends a buffer to the data file until the volume is nearly full, then
//! tops up in 1 MiB slices. A [`UsageMonitor`] reports progress on its own
//! thread for the whole operation.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::is_out_of_space;
use crate::io::{Buffer, CancellationSignal, DiskUsage, MonitorStats, UsageMonitor, UsageProbe};
use crate::{FtdError, Result, MIB};

/// How a fill operation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillOutcome {
    /// Free space dropped below the fine-write slice size
    Completed,
    /// The cancellation signal was raised mid-fill
    Cancelled,
    /// A write failed because the device is full
    ExhaustedSpace,
    /// Any other write or probe failure
    Failed(String),
}

impl FillOutcome {
    /// Whether the fill ended the way a fill is expected to end
    pub fn is_success(&self) -> bool {
        !matches!(self, FillOutcome::Failed(_))
    }
}

/// Summary of a fill operation
#[derive(Debug, Clone)]
pub struct FillReport {
    pub outcome: FillOutcome,
    /// Growth of the data file
    pub bytes_written: u64,
    /// Full-buffer appends
    pub coarse_writes: u64,
    /// 1 MiB appends
    pub fine_writes: u64,
    pub elapsed: Duration,
    /// Volume usage after the fill, if it could be sampled
    pub final_usage: Option<DiskUsage>,
    pub monitor: MonitorStats,
}

#[derive(Debug, Default)]
struct WriteCounts {
    coarse: u64,
    fine: u64,
}

/// Fills the volume holding the data file
pub struct ContiguousFiller {
    probe: Arc<dyn UsageProbe>,
    monitor_interval: Duration,
}

impl ContiguousFiller {
    pub fn new(probe: Arc<dyn UsageProbe>) -> Self {
        Self {
            probe,
            monitor_interval: UsageMonitor::DEFAULT_INTERVAL,
        }
    }

    /// Set how often the background monitor samples the volume
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Append `buffer` to `path` until the volume cannot take another full
    /// buffer, then append 1 MiB slices of it while more than 1 MiB is free.
    ///
    /// Cancellation, a full device and other write failures are reported
    /// through [`FillReport::outcome`]. An error is returned only for an
    /// empty buffer or when the data file cannot be opened. `signal` is
    /// raised when the call returns, which also stops the monitor.
    pub fn fill_contiguously(
        &self,
        buffer: &Buffer,
        path: &Path,
        signal: &CancellationSignal,
    ) -> Result<FillReport> {
        if buffer.is_empty() {
            return Err(FtdError::ConfigError(
                "cannot fill a drive with an empty buffer".to_string(),
            ));
        }
        info!("data_filepath=\"{}\"", path.display());

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let original_size = file.metadata()?.len();
        self.fill_with_writer(&mut file, buffer, path, signal, original_size)
    }

    fn fill_with_writer<W: Write>(
        &self,
        writer: &mut W,
        buffer: &Buffer,
        path: &Path,
        signal: &CancellationSignal,
        original_size: u64,
    ) -> Result<FillReport> {
        let start = Instant::now();
        let monitor = UsageMonitor::new(Arc::clone(&self.probe))
            .with_interval(self.monitor_interval)
            .spawn(signal.clone(), path.to_path_buf())?;

        let mut counts = WriteCounts::default();
        let outcome = match self.write_phases(writer, buffer, path, signal, &mut counts) {
            Ok(outcome) => outcome,
            Err(e) if is_out_of_space(&e) => FillOutcome::ExhaustedSpace,
            Err(e) => FillOutcome::Failed(e.to_string()),
        };
        let monitor_stats = monitor.stop();

        match &outcome {
            FillOutcome::Cancelled => info!("cancelling"),
            FillOutcome::Completed | FillOutcome::ExhaustedSpace => info!("done"),
            FillOutcome::Failed(reason) => warn!("fill stopped on error: {}", reason),
        }

        let bytes_written = fs::metadata(path)
            .map(|m| m.len().saturating_sub(original_size))
            .unwrap_or(0);
        let final_usage = self.probe.usage(path).ok();
        if let Some(usage) = &final_usage {
            debug!("disk usage: {}%", usage.percent_used);
        }

        Ok(FillReport {
            outcome,
            bytes_written,
            coarse_writes: counts.coarse,
            fine_writes: counts.fine,
            elapsed: start.elapsed(),
            final_usage,
            monitor: monitor_stats,
        })
    }

    fn write_phases<W: Write>(
        &self,
        writer: &mut W,
        buffer: &Buffer,
        path: &Path,
        signal: &CancellationSignal,
        counts: &mut WriteCounts,
    ) -> io::Result<FillOutcome> {
        let buffer_len = buffer.len() as u64;

        loop {
            if signal.is_cancelled() {
                return Ok(FillOutcome::Cancelled);
            }
            if self.probe.free_bytes(path)? <= buffer_len {
                break;
            }
            writer.write_all(buffer.as_bytes())?;
            counts.coarse += 1;
        }

        debug!(coarse_writes = counts.coarse, "switching to 1 MiB writes");
        for slice in buffer.megabyte_slices() {
            if signal.is_cancelled() {
                return Ok(FillOutcome::Cancelled);
            }
            if self.probe.free_bytes(path)? <= MIB as u64 {
                break;
            }
            writer.write_all(slice)?;
            counts.fine += 1;
        }
        writer.flush()?;

        Ok(FillOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{create_buffer, Fill};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::tempdir;

    /// Volume whose free space is its capacity minus the data file size
    struct SimulatedVolume {
        capacity: u64,
        data_file: PathBuf,
    }

    impl UsageProbe for SimulatedVolume {
        fn usage(&self, _path: &Path) -> io::Result<DiskUsage> {
            let used = fs::metadata(&self.data_file).map(|m| m.len()).unwrap_or(0);
            let free = self.capacity.saturating_sub(used);
            Ok(DiskUsage::from_counts(self.capacity, free, free))
        }
    }

    /// Reports plenty of space and raises the signal on the Nth filler probe
    struct CancellingProbe {
        signal: CancellationSignal,
        cancel_after: u64,
        calls: AtomicU64,
    }

    impl UsageProbe for CancellingProbe {
        fn usage(&self, _path: &Path) -> io::Result<DiskUsage> {
            Ok(DiskUsage::from_counts(u64::MAX / 2, u64::MAX / 4, u64::MAX / 4))
        }

        fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.cancel_after {
                self.signal.cancel();
            }
            Ok(u64::MAX / 4)
        }
    }

    struct PlentyOfSpace;

    impl UsageProbe for PlentyOfSpace {
        fn usage(&self, _path: &Path) -> io::Result<DiskUsage> {
            Ok(DiskUsage::from_counts(u64::MAX / 2, u64::MAX / 4, u64::MAX / 4))
        }
    }

    /// Accepts `remaining` writes, then fails with `kind`
    struct FailingWriter {
        remaining: u64,
        kind: io::ErrorKind,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::from(self.kind));
            }
            self.remaining -= 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn filler(probe: Arc<dyn UsageProbe>) -> ContiguousFiller {
        ContiguousFiller::new(probe).with_monitor_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_coarse_then_fine_on_small_volume() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");
        let volume = Arc::new(SimulatedVolume {
            capacity: 10 * MIB as u64,
            data_file: path.clone(),
        });

        let buffer = create_buffer(4 * 1024, Fill::Constant(0x5A)).unwrap();
        let signal = CancellationSignal::new();
        let report = filler(volume.clone())
            .fill_contiguously(&buffer, &path, &signal)
            .unwrap();

        assert_eq!(report.outcome, FillOutcome::Completed);
        assert_eq!(report.coarse_writes, 2);
        assert_eq!(report.fine_writes, 1);
        assert_eq!(report.bytes_written, 9 * MIB as u64);
        let free = volume.free_bytes(&path).unwrap();
        assert!(free <= MIB as u64);
        assert!(free < buffer.len() as u64);
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_small_buffer_skips_fine_phase() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");
        let volume = Arc::new(SimulatedVolume {
            capacity: 100 * 1024,
            data_file: path.clone(),
        });

        let buffer = create_buffer(16, Fill::Random).unwrap();
        let report = filler(volume)
            .fill_contiguously(&buffer, &path, &CancellationSignal::new())
            .unwrap();

        assert_eq!(report.outcome, FillOutcome::Completed);
        // 100 KiB free: writes at 100, 84, 68, 52, 36, 20 KiB free
        assert_eq!(report.coarse_writes, 6);
        assert_eq!(report.fine_writes, 0);
        assert_eq!(report.bytes_written, 6 * 16 * 1024);
    }

    #[test]
    fn test_cancellation_halts_within_one_iteration() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");
        let signal = CancellationSignal::new();
        let probe = Arc::new(CancellingProbe {
            signal: signal.clone(),
            cancel_after: 3,
            calls: AtomicU64::new(0),
        });

        let buffer = create_buffer(1, Fill::Constant(1)).unwrap();
        let report = filler(probe.clone())
            .fill_contiguously(&buffer, &path, &signal)
            .unwrap();

        assert_eq!(report.outcome, FillOutcome::Cancelled);
        assert_eq!(report.coarse_writes, 3);
        assert_eq!(report.bytes_written, 3 * 1024);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_already_cancelled_fill_writes_nothing() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");
        let signal = CancellationSignal::new();
        signal.cancel();

        let buffer = create_buffer(1, Fill::Constant(1)).unwrap();
        let report = filler(Arc::new(PlentyOfSpace))
            .fill_contiguously(&buffer, &path, &signal)
            .unwrap();

        assert_eq!(report.outcome, FillOutcome::Cancelled);
        assert_eq!(report.bytes_written, 0);
        assert_eq!(report.monitor, MonitorStats::default());
    }

    #[test]
    fn test_full_device_is_a_normal_stop() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");
        fs::write(&path, b"").unwrap();

        let mut writer = FailingWriter {
            remaining: 5,
            kind: io::ErrorKind::StorageFull,
        };
        let buffer = create_buffer(1, Fill::Constant(1)).unwrap();
        let report = filler(Arc::new(PlentyOfSpace))
            .fill_with_writer(&mut writer, &buffer, &path, &CancellationSignal::new(), 0)
            .unwrap();

        assert_eq!(report.outcome, FillOutcome::ExhaustedSpace);
        assert!(report.outcome.is_success());
        assert_eq!(report.coarse_writes, 5);
    }

    #[test]
    fn test_other_write_errors_are_tagged_failures() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");
        fs::write(&path, b"").unwrap();

        let mut writer = FailingWriter {
            remaining: 0,
            kind: io::ErrorKind::PermissionDenied,
        };
        let buffer = create_buffer(1, Fill::Constant(1)).unwrap();
        let signal = CancellationSignal::new();
        let report = filler(Arc::new(PlentyOfSpace))
            .fill_with_writer(&mut writer, &buffer, &path, &signal, 0)
            .unwrap();

        assert!(matches!(report.outcome, FillOutcome::Failed(_)));
        assert!(!report.outcome.is_success());
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");

        let result = filler(Arc::new(PlentyOfSpace)).fill_contiguously(
            &Buffer::default(),
            &path,
            &CancellationSignal::new(),
        );
        assert!(matches!(result, Err(FtdError::ConfigError(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_fill_appends_to_existing_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.dat");
        fs::write(&path, vec![0u8; 3 * MIB]).unwrap();
        let volume = Arc::new(SimulatedVolume {
            capacity: 8 * MIB as u64,
            data_file: path.clone(),
        });

        let buffer = create_buffer(2 * 1024, Fill::Constant(2)).unwrap();
        let report = filler(volume)
            .fill_contiguously(&buffer, &path, &CancellationSignal::new())
            .unwrap();

        // 5 MiB free: two 2 MiB writes leave 1 MiB, which is not > 1 MiB
        assert_eq!(report.coarse_writes, 2);
        assert_eq!(report.fine_writes, 0);
        assert_eq!(report.bytes_written, 4 * MIB as u64);
        assert_eq!(fs::metadata(&path).unwrap().len(), 7 * MIB as u64);
    }
}
