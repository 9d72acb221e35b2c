use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Space accounting for the filesystem containing a path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Bytes in use
    pub used_bytes: u64,
    /// Bytes available to the calling user
    pub free_bytes: u64,
    /// `used / (used + free)` as a percentage
    pub percent_used: f64,
}

impl DiskUsage {
    /// Build usage from raw counters. `free_bytes` is the space available to
    /// unprivileged callers, `total_free_bytes` includes reserved blocks.
    pub fn from_counts(total_bytes: u64, total_free_bytes: u64, free_bytes: u64) -> Self {
        let used_bytes = total_bytes.saturating_sub(total_free_bytes);
        let usable = used_bytes + free_bytes;
        let percent_used = if usable == 0 {
            0.0
        } else {
            (used_bytes as f64 / usable as f64 * 1000.0).round() / 10.0
        };
        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            percent_used,
        }
    }
}

/// Samples free and used space of the volume holding a path.
///
/// Implementations must be cheap to call repeatedly and safe to share
/// between the writer thread and the monitor thread.
pub trait UsageProbe: Send + Sync {
    fn usage(&self, path: &Path) -> io::Result<DiskUsage>;

    /// Shorthand for the free byte count
    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        Ok(self.usage(path)?.free_bytes)
    }
}

/// Probe backed by the operating system's filesystem statistics
#[derive(Debug, Clone, Default)]
pub struct PlatformUsageProbe;

impl PlatformUsageProbe {
    pub fn new() -> Self {
        Self
    }
}

/// The data file usually does not exist before the first write, so stat
/// the closest ancestor that does.
fn existing_ancestor(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    absolute
        .ancestors()
        .find(|candidate| candidate.exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no existing ancestor for {}", path.display()),
            )
        })
}

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    impl UsageProbe for PlatformUsageProbe {
        fn usage(&self, path: &Path) -> io::Result<DiskUsage> {
            let target = existing_ancestor(path)?;
            let c_path = CString::new(target.as_os_str().as_bytes())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

            let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
            // SAFETY: c_path is NUL terminated and stat is a valid out pointer
            let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }

            let fragment = if stat.f_frsize > 0 {
                stat.f_frsize as u64
            } else {
                stat.f_bsize as u64
            };
            Ok(DiskUsage::from_counts(
                stat.f_blocks as u64 * fragment,
                stat.f_bfree as u64 * fragment,
                stat.f_bavail as u64 * fragment,
            ))
        }
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::os::windows::ffi::OsStrExt;

    extern "system" {
        fn GetDiskFreeSpaceExW(
            directory_name: *const u16,
            free_bytes_available_to_caller: *mut u64,
            total_number_of_bytes: *mut u64,
            total_number_of_free_bytes: *mut u64,
        ) -> i32;
    }

    impl UsageProbe for PlatformUsageProbe {
        fn usage(&self, path: &Path) -> io::Result<DiskUsage> {
            let target = existing_ancestor(path)?;
            let wide: Vec<u16> = target
                .as_os_str()
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();

            let mut available = 0u64;
            let mut total = 0u64;
            let mut total_free = 0u64;
            // SAFETY: wide is NUL terminated and the out pointers are valid
            let ok = unsafe {
                GetDiskFreeSpaceExW(wide.as_ptr(), &mut available, &mut total, &mut total_free)
            };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(DiskUsage::from_counts(total, total_free, available))
        }
    }
}

/// Create the probe for the current platform
pub fn create_usage_probe() -> PlatformUsageProbe {
    PlatformUsageProbe::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_usage_of_existing_directory() {
        let temp_dir = tempdir().unwrap();
        let probe = create_usage_probe();

        let usage = probe.usage(temp_dir.path()).unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.free_bytes <= usage.total_bytes);
        assert!(usage.used_bytes <= usage.total_bytes);
        assert!((0.0..=100.0).contains(&usage.percent_used));
    }

    #[test]
    fn test_usage_of_missing_file_uses_parent() {
        let temp_dir = tempdir().unwrap();
        let probe = create_usage_probe();

        let missing = temp_dir.path().join("not").join("yet").join("data.dat");
        let from_missing = probe.usage(&missing).unwrap();
        let from_dir = probe.usage(temp_dir.path()).unwrap();
        assert_eq!(from_missing.total_bytes, from_dir.total_bytes);
    }

    #[test]
    fn test_free_bytes_shorthand() {
        let temp_dir = tempdir().unwrap();
        let probe = create_usage_probe();
        assert!(probe.free_bytes(temp_dir.path()).unwrap() > 0);
    }

    #[test]
    fn test_percent_from_counts() {
        let usage = DiskUsage::from_counts(100, 40, 30);
        assert_eq!(usage.used_bytes, 60);
        assert_eq!(usage.free_bytes, 30);
        assert!((usage.percent_used - 66.7).abs() < 1e-9);

        let empty = DiskUsage::from_counts(0, 0, 0);
        assert_eq!(empty.percent_used, 0.0);
    }
}
