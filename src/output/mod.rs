//! Output module for run reports and sink statistics
//!
//! This module handles:
//! - Printing the outcome of a supervised run
//! - Printing merge results and resume plans
//! - Recording sink statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, SinkStatistics};

use crate::storage::MergeReport;
use crate::supervisor::{ResumePoint, SupervisorReport};
use crate::worker::Partition;

/// Formats the partitions of a run and where each would resume
pub fn format_plan(plan: &[(Partition, ResumePoint)]) -> String {
    let mut out = String::new();
    out.push_str("Worker  Start       End         Direction   Resume\n");

    for (partition, point) in plan {
        out.push_str(&format!(
            "{:<7} {:<11} {:<11} {:<11} {}\n",
            partition.worker_id,
            partition.start,
            partition.end,
            partition.direction.as_str(),
            point.describe()
        ));
    }
    out
}

pub fn print_plan(plan: &[(Partition, ResumePoint)]) {
    println!("=== Partitions ===\n");
    print!("{}", format_plan(plan));
}

/// Prints the outcome of a supervised run
pub fn print_run_report(report: &SupervisorReport) {
    println!("=== Run Summary ===\n");
    println!("  Workers launched: {}", report.launched);
    println!("  Restarts: {}", report.restarts);
    println!("  Completed: {}", join_ids(&report.completed));
    if !report.unfinished.is_empty() {
        println!("  Unfinished: {}", join_ids(&report.unfinished));
    }
    if report.interrupted {
        println!("  Interrupted: yes");
    }
    if let Some(merge) = &report.merge {
        println!();
        print_merge_report(merge);
    }
}

/// Prints the outcome of a merge
pub fn print_merge_report(report: &MergeReport) {
    println!("=== Merge Summary ===\n");
    println!("  Sources merged: {}", report.sources_merged);
    println!("  Records read: {}", report.records_read);
    println!("  Records inserted: {}", report.records_inserted);
    println!("  Duplicates ignored: {}", report.duplicates_ignored);

    if !report.skipped.is_empty() {
        println!("  Skipped sources:");
        for (path, reason) in &report.skipped {
            println!("    - {}: {}", path.display(), reason);
        }
    }
}

fn join_ids(ids: &[u32]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
