//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::crawler::RecordKind;
use crate::state::ParentStatus;
use crate::storage::{RunRecord, Storage};
use crate::HarvestError;
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Count of records by kind
    pub records_by_kind: HashMap<RecordKind, u64>,

    /// Topics by reply-walk status
    pub topics_by_status: HashMap<ParentStatus, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl HarvestStatistics {
    /// Fraction of topics whose replies were fully walked, as a percentage
    pub fn topic_completion(&self) -> f64 {
        let done = self
            .topics_by_status
            .get(&ParentStatus::Done)
            .copied()
            .unwrap_or(0);
        let total: u64 = self.topics_by_status.values().sum();
        if total > 0 {
            (done as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    let records_by_kind = storage.count_records_by_kind()?;
    let total_records = records_by_kind.values().sum();
    let topics_by_status = storage.count_parents_by_status(RecordKind::Topic)?;
    let latest_run = storage.get_latest_run()?;

    Ok(HarvestStatistics {
        total_records,
        records_by_kind,
        topics_by_status,
        latest_run,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  ID: {}", run.id);
        println!("  Started: {}", run.started_at);
        println!(
            "  Finished: {}",
            run.finished_at.as_deref().unwrap_or("(not finished)")
        );
        println!("  Status: {}", run.status.to_db_string());
        println!();
    }

    println!("Records by Kind:");
    for kind in RecordKind::all_kinds() {
        let count = stats.records_by_kind.get(&kind).copied().unwrap_or(0);
        if count > 0 {
            println!("  {}: {}", kind, count);
        }
    }
    println!("  Total: {}", stats.total_records);
    println!();

    if !stats.topics_by_status.is_empty() {
        println!("Topics by Reply Status:");
        for status in ParentStatus::all_statuses() {
            let count = stats.topics_by_status.get(&status).copied().unwrap_or(0);
            println!("  {}: {}", status, count);
        }
        println!();

        println!("Reply Walks Complete: {:.1}%", stats.topic_completion());
    }
}
