//! Output module for harvest reports and statistics
//!
//! This module handles:
//! - Logging the per-phase report at the end of a run
//! - Loading and printing database statistics

mod report;
pub mod stats;

pub use report::log_report;
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
