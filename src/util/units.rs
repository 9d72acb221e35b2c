//! Units formatting and conversion utilities
//!
//! Human-readable sizes and write rates for log lines, the sweep table
//! and run summaries.

use std::time::Duration;

use crate::{KIB, MIB};

/// Format bytes into human-readable size with appropriate units
///
/// # Examples
/// ```
/// use fill_the_drive::util::units::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1048576), "1.0 MiB");
/// assert_eq!(format_bytes(1073741824), "1.0 GiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format a buffer size given in kilobytes, keeping whole units exact
///
/// # Examples
/// ```
/// use fill_the_drive::util::units::format_size_kb;
///
/// assert_eq!(format_size_kb(4), "4 KiB");
/// assert_eq!(format_size_kb(3072), "3 MiB");
/// assert_eq!(format_size_kb(1536), "1536 KiB");
/// ```
pub fn format_size_kb(size_kb: u64) -> String {
    let bytes = size_kb.saturating_mul(KIB as u64);
    if bytes >= MIB as u64 && bytes % MIB as u64 == 0 {
        format!("{} MiB", bytes / MIB as u64)
    } else {
        format!("{} KiB", size_kb)
    }
}

/// Calculate throughput in MB/s from bytes and duration.
/// A zero duration yields 0.0.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use fill_the_drive::util::units::calculate_throughput_mbps;
///
/// let throughput = calculate_throughput_mbps(1048576, Duration::from_secs(1));
/// assert!((throughput - 1.0).abs() < 0.01);
/// ```
pub fn calculate_throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }

    bytes as f64 / MIB as f64 / duration.as_secs_f64()
}

/// Format throughput value with appropriate units
///
/// # Examples
/// ```
/// use fill_the_drive::util::units::format_throughput;
///
/// assert_eq!(format_throughput(1024.0), "1.0 GiB/s");
/// assert_eq!(format_throughput(1.5), "1.5 MiB/s");
/// ```
pub fn format_throughput(mbps: f64) -> String {
    if mbps >= 1024.0 {
        format!("{:.1} GiB/s", mbps / 1024.0)
    } else if mbps >= 1.0 {
        format!("{:.1} MiB/s", mbps)
    } else if mbps >= 0.001 {
        format!("{:.1} KiB/s", mbps * 1024.0)
    } else {
        format!("{:.3} MiB/s", mbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(1099511627776), "1.0 TiB");
    }

    #[test]
    fn test_format_size_kb() {
        assert_eq!(format_size_kb(1), "1 KiB");
        assert_eq!(format_size_kb(1024), "1 MiB");
        assert_eq!(format_size_kb(128 * 1024 * 3), "384 MiB");
        assert_eq!(format_size_kb(96), "96 KiB");
    }

    #[test]
    fn test_calculate_throughput_mbps() {
        let throughput = calculate_throughput_mbps(2 * 1048576, Duration::from_secs(2));
        assert!((throughput - 1.0).abs() < 1e-9);

        let throughput = calculate_throughput_mbps(1048576, Duration::from_millis(250));
        assert!((throughput - 4.0).abs() < 1e-9);

        assert_eq!(calculate_throughput_mbps(1000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_format_throughput() {
        assert_eq!(format_throughput(1.5), "1.5 MiB/s");
        assert_eq!(format_throughput(2048.0), "2.0 GiB/s");
        assert_eq!(format_throughput(0.5), "512.0 KiB/s");
        assert_eq!(format_throughput(0.0), "0.000 MiB/s");
    }
}
