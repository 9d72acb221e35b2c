//! Data models module
//!
//! Contains the performance table produced by the throughput sweep and
//! the run summaries kept in the history file.

pub mod result;

// Re-export commonly used types
pub use result::{PerformanceRecord, PerformanceTable, RunRecord};
