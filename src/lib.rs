//! perfgate - continuous performance-regression checks for benchmark competitions
//!
//! Competing implementations are measured against one declared baseline. For
//! every metric the measured samples are turned into ranges, compared with the
//! limits stored for the benchmark, and either accepted, failed, or (when
//! adjustment is enabled) widened and persisted. A bounded rerun loop drives
//! repeated measurement runs until the verdict is stable.

pub mod analysis;
pub mod benchmark;
pub mod cli;
pub mod limits;
pub mod measurement;
pub mod messages;
pub mod metrics;
pub mod replay;
pub mod target;
