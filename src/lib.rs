//! fill-the-drive - disk write throughput benchmark and drive filler
//!
//! Generates byte buffers, writes them to a target file under time and
//! iteration bounds, sweeps buffer sizes to find the fastest one, and can
//! fill a drive to near capacity while monitoring free space.

pub mod bench;
pub mod config;
pub mod io;
pub mod models;
pub mod ops;
pub mod util;

/// Common error type
#[derive(Debug, thiserror::Error)]
pub enum FtdError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// Configuration validation or parsing error
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Output directory cannot be created or resolved
    #[error("Path error: {0}")]
    PathError(String),
    /// Operation interrupted by the user
    #[error("Cancelled: {0}")]
    CancellationError(String),
    /// Results persistence error
    #[error("Results persistence error: {0}")]
    PersistenceError(String),
}

impl From<serde_json::Error> for FtdError {
    fn from(err: serde_json::Error) -> Self {
        FtdError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for FtdError {
    fn from(err: toml::de::Error) -> Self {
        FtdError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for FtdError {
    fn from(err: toml::ser::Error) -> Self {
        FtdError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for fill-the-drive operations
pub type Result<T> = std::result::Result<T, FtdError>;

/// Error handling utilities
pub mod error {
    use super::FtdError;
    use std::io;

    /// Whether an I/O error means the device ran out of space.
    pub fn is_out_of_space(err: &io::Error) -> bool {
        if err.kind() == io::ErrorKind::StorageFull {
            return true;
        }
        match err.raw_os_error() {
            #[cfg(unix)]
            Some(code) => code == libc::ENOSPC || code == libc::EDQUOT,
            // ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL
            #[cfg(windows)]
            Some(code) => code == 39 || code == 112,
            #[cfg(not(any(unix, windows)))]
            Some(_) => false,
            None => false,
        }
    }

    /// Whether the error is a user interrupt rather than a failure.
    pub fn is_cancellation(error: &FtdError) -> bool {
        matches!(error, FtdError::CancellationError(_))
    }

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &FtdError) -> String {
        match error {
            FtdError::IoError(err) if is_out_of_space(err) => {
                "The target drive is full. Free up space or choose another data path.".to_string()
            }
            FtdError::IoError(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                "Permission denied. Check the permissions of the data and perf file paths."
                    .to_string()
            }
            FtdError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your arguments.", msg)
            }
            FtdError::PathError(msg) => {
                format!("{}. Make sure the output directories are writable.", msg)
            }
            FtdError::CancellationError(_) => "Operation was cancelled by user.".to_string(),
            _ => error.to_string(),
        }
    }
}

pub const APP_NAME: &str = "fill-the-drive";
pub const CONFIG_FILE: &str = "fill-the-drive.toml";
pub const HISTORY_FILE: &str = "history.json";
pub const MAX_RESULTS_HISTORY: usize = 100;

/// Bytes per kilobyte, the unit buffer sizes are expressed in.
pub const KIB: usize = 1024;
/// Bytes per megabyte, the fine-write slice size.
pub const MIB: usize = 1024 * 1024;
