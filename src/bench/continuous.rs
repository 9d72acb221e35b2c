//! Bounded continuous write loop
//!
//! Writes one buffer to a file over and over until both a wall-clock bound
//! and an iteration bound have been reached.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::io::{Buffer, CancellationSignal};
use crate::util::units::calculate_throughput_mbps;
use crate::{FtdError, Result};

/// Outcome of a bounded write run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteResult {
    /// Growth of the target file, measured from its size on disk
    pub bytes_written: u64,
    /// Wall-clock time spent in the write loop
    pub elapsed: Duration,
    /// Number of buffer writes performed
    pub iterations: u64,
}

impl WriteResult {
    /// Throughput in MB/s, zero for a run that took no measurable time
    pub fn throughput_mbps(&self) -> f64 {
        calculate_throughput_mbps(self.bytes_written, self.elapsed)
    }
}

/// Repeated buffer writer
#[derive(Debug, Clone, Default)]
pub struct ContinuousWriter {
    signal: Option<CancellationSignal>,
}

impl ContinuousWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the loop with [`FtdError::CancellationError`] once `signal` is raised
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Truncate `path` and write `buffer` to it until `elapsed >= duration`
    /// AND `iterations >= max_iterations`.
    ///
    /// The loop keeps going while either bound is unmet. With both bounds at
    /// zero the condition fails on the first check and nothing is written.
    /// Write errors, including a full disk, are returned to the caller.
    pub fn write_continuously(
        &self,
        buffer: &Buffer,
        path: &Path,
        duration: Duration,
        max_iterations: u64,
    ) -> Result<WriteResult> {
        info!(
            "data_filepath=\"{}\", duration={:?}, iterations={}",
            path.display(),
            duration,
            max_iterations
        );

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let original_size = fs::metadata(path)?.len();

        let start = Instant::now();
        let mut iterations = 0u64;
        while start.elapsed() < duration || iterations < max_iterations {
            if self.is_cancelled() {
                return Err(FtdError::CancellationError(format!(
                    "write loop stopped after {} iterations",
                    iterations
                )));
            }
            file.write_all(buffer.as_bytes())?;
            iterations += 1;
        }
        let elapsed = start.elapsed();
        drop(file);

        let bytes_written = fs::metadata(path)?.len().saturating_sub(original_size);
        let result = WriteResult {
            bytes_written,
            elapsed,
            iterations,
        };
        debug!(
            "bytes_written={}, elapsed={:?}, iteration={}, throughput={:.3} MB/s",
            result.bytes_written,
            result.elapsed,
            result.iterations,
            result.throughput_mbps()
        );
        Ok(result)
    }

    fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(CancellationSignal::is_cancelled)
    }
}

/// Run a [`ContinuousWriter`] without cancellation support
pub fn write_continuously(
    buffer: &Buffer,
    path: &Path,
    duration: Duration,
    max_iterations: u64,
) -> Result<WriteResult> {
    ContinuousWriter::new().write_continuously(buffer, path, duration, max_iterations)
}
