//! End-of-run reporting

use crate::crawler::{HarvestReport, PhaseReport};

/// Logs one line per phase plus every failed walk
pub fn log_report(report: &HarvestReport) {
    for phase in &report.phases {
        log_phase(phase);
    }

    if report.cancelled {
        tracing::warn!("Run {} was interrupted", report.run_id);
    }

    tracing::info!(
        "Run {}: {} items across {} phases, {} failed walks",
        report.run_id,
        report.total_items(),
        report.phases.len(),
        report.total_failures()
    );
}

fn log_phase(phase: &PhaseReport) {
    tracing::info!(
        "[{}] {}/{} walks ok, {} items ({} rows written) over {} pages",
        phase.name,
        phase.succeeded,
        phase.parents,
        phase.items,
        phase.persisted,
        phase.pages
    );

    let mut stops: Vec<_> = phase.stops.iter().collect();
    stops.sort_by(|a, b| b.1.cmp(a.1));
    for (stop, count) in stops {
        tracing::debug!("[{}] stopped by {}: {}", phase.name, stop, count);
    }

    for (parent, error) in &phase.failures {
        tracing::warn!("[{}] {} failed: {}", phase.name, parent, error);
    }
}
