//! Background disk usage monitor
//!
//! A dedicated thread samples the volume at a fixed interval and logs the
//! percentage used until a shared [`CancellationSignal`] is raised.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::disk::UsageProbe;

/// One-shot stop flag shared between threads. Once raised it stays raised.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counters reported by a stopped monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Successful probe rounds
    pub samples: u64,
    /// Probe rounds that failed
    pub errors: u64,
}

/// Periodic disk usage reporter
pub struct UsageMonitor {
    probe: Arc<dyn UsageProbe>,
    interval: Duration,
    tick: Duration,
}

impl UsageMonitor {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
    const TICK: Duration = Duration::from_millis(10);

    pub fn new(probe: Arc<dyn UsageProbe>) -> Self {
        Self {
            probe,
            interval: Self::DEFAULT_INTERVAL,
            tick: Self::TICK,
        }
    }

    /// Set the time between probe rounds, clamped to 10ms..=1s
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.clamp(Self::TICK, Self::DEFAULT_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the monitor loop on the current thread until `signal` is raised.
    pub fn run(&self, signal: &CancellationSignal, path: &Path) -> MonitorStats {
        let mut stats = MonitorStats::default();

        while !signal.is_cancelled() {
            match self.probe.usage(path) {
                Ok(usage) => {
                    stats.samples += 1;
                    info!("disk usage: {}%", usage.percent_used);
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!("disk usage probe failed for {}: {}", path.display(), e);
                }
            }

            let round_start = Instant::now();
            while round_start.elapsed() < self.interval {
                if signal.is_cancelled() {
                    break;
                }
                thread::sleep(self.tick);
            }
        }

        debug!(?stats, "usage monitor stopped");
        stats
    }

    /// Start the monitor on its own thread.
    pub fn spawn(self, signal: CancellationSignal, path: PathBuf) -> std::io::Result<MonitorHandle> {
        let thread_signal = signal.clone();
        let handle = thread::Builder::new()
            .name("usage-monitor".to_string())
            .spawn(move || self.run(&thread_signal, &path))?;

        Ok(MonitorHandle {
            signal,
            handle: Some(handle),
        })
    }
}

/// Owner of a running monitor thread. Dropping the handle raises the signal
/// and joins the thread, so the monitor never outlives its operation.
pub struct MonitorHandle {
    signal: CancellationSignal,
    handle: Option<JoinHandle<MonitorStats>>,
}

impl MonitorHandle {
    /// Stop the monitor and wait for it to finish
    pub fn stop(mut self) -> MonitorStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> MonitorStats {
        self.signal.cancel();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                warn!("usage monitor thread panicked");
                MonitorStats::default()
            }),
            None => MonitorStats::default(),
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}
