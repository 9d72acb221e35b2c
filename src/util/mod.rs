//! Utility functions module
//!
//! Contains helpers for formatting sizes and write rates.

pub mod units;

// Re-export commonly used functions
pub use units::{calculate_throughput_mbps, format_bytes, format_size_kb, format_throughput};
