//! I/O primitives module
//!
//! Buffer generation, filesystem usage probing and the background
//! usage monitor.

pub mod buffer;
pub mod disk;
pub mod monitor;

pub use buffer::{buffer_len, create_buffer, Buffer, Fill};
pub use disk::{create_usage_probe, DiskUsage, PlatformUsageProbe, UsageProbe};
pub use monitor::{CancellationSignal, MonitorHandle, MonitorStats, UsageMonitor};
