//! Statistics of a record sink
//!
//! This module provides functionality for extracting and displaying
//! sink statistics from the storage layer.

use crate::storage::{Sink, SinkResult};

/// Sink statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStatistics {
    /// Total number of records
    pub total_records: u64,

    /// Lowest and highest identifiers present
    pub identifier_bounds: Option<(i64, i64)>,

    /// Record count per faction, largest first
    pub faction_counts: Vec<(String, u64)>,

    /// Lowest and highest point totals
    pub points_range: Option<(i64, i64)>,
}

/// Loads statistics from a sink
///
/// # Arguments
///
/// * `sink` - The sink to query
///
/// # Returns
///
/// * `Ok(SinkStatistics)` - Successfully loaded statistics
/// * `Err(SinkError)` - Failed to query statistics
pub fn load_statistics(sink: &dyn Sink) -> SinkResult<SinkStatistics> {
    let total_records = sink.count()?;

    let identifier_bounds = match (sink.min_identifier()?, sink.max_identifier()?) {
        (Some(low), Some(high)) => Some((low, high)),
        _ => None,
    };

    Ok(SinkStatistics {
        total_records,
        identifier_bounds,
        faction_counts: sink.faction_counts()?,
        points_range: sink.points_range()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &SinkStatistics) {
    println!("=== Sink Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    if let Some((low, high)) = stats.identifier_bounds {
        println!("  Identifiers: {} - {}", low, high);
    }
    if let Some((low, high)) = stats.points_range {
        println!("  Points: {} - {}", low, high);
    }
    println!();

    if !stats.faction_counts.is_empty() {
        println!("Records by Faction:");
        for (faction, count) in &stats.faction_counts {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            let label = if faction.is_empty() {
                "(unknown)"
            } else {
                faction
            };
            println!("  {}: {} ({:.1}%)", label, count, percentage);
        }
    }
}
