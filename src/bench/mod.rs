//! Benchmark engine module
//!
//! Contains the bounded continuous writer, the contiguous drive filler and
//! the buffer size throughput sweep.

pub mod continuous;
pub mod fill;
pub mod sweep;

// Re-export commonly used types
pub use continuous::{write_continuously, ContinuousWriter, WriteResult};
pub use fill::{ContiguousFiller, FillOutcome, FillReport};
pub use sweep::{default_sizes_kb, BestCandidate, SweepResult, SweepSchedule, ThroughputBenchmark};
