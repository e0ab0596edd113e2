//! Identifier ranges and partitioning

use crate::HarvestError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Walk direction within a range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Descending,
    Ascending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Descending => "descending",
            Self::Ascending => "ascending",
        }
    }

    /// Signed distance between consecutive identifiers
    pub fn step(&self) -> i64 {
        match self {
            Self::Descending => -1,
            Self::Ascending => 1,
        }
    }

    /// True once `cursor` has reached the exclusive `end`
    pub fn has_reached(&self, cursor: i64, end: i64) -> bool {
        match self {
            Self::Descending => cursor <= end,
            Self::Ascending => cursor >= end,
        }
    }
}

/// A worker's share of the global identifier space, `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub worker_id: u32,
    pub start: i64,
    pub end: i64,
    pub direction: Direction,
}

impl Partition {
    pub fn contains(&self, identifier: i64) -> bool {
        let (low, high) = self.bounds();
        (low..=high).contains(&identifier)
    }

    /// Last identifier the partition walks
    pub fn final_identifier(&self) -> i64 {
        self.end - self.direction.step()
    }

    /// Inclusive `(lowest, highest)` identifiers of the partition
    pub fn bounds(&self) -> (i64, i64) {
        let last = self.final_identifier();
        (self.start.min(last), self.start.max(last))
    }

    pub fn len(&self) -> u64 {
        self.start.abs_diff(self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Range a worker walks when resuming at `start`
    pub fn resume_at(&self, start: i64, sink_location: PathBuf) -> WorkerRange {
        WorkerRange {
            worker_id: self.worker_id,
            start_identifier: start,
            end_identifier: self.end,
            direction: self.direction,
            sink_location,
        }
    }
}

/// The identifiers one worker process walks, plus where it writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRange {
    pub worker_id: u32,
    pub start_identifier: i64,
    /// Exclusive
    pub end_identifier: i64,
    pub direction: Direction,
    pub sink_location: PathBuf,
}

impl WorkerRange {
    /// Identifiers left to walk
    pub fn len(&self) -> u64 {
        if self.direction.has_reached(self.start_identifier, self.end_identifier) {
            0
        } else {
            self.start_identifier.abs_diff(self.end_identifier)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn final_identifier(&self) -> i64 {
        self.end_identifier - self.direction.step()
    }
}

/// Splits `[start, end)` into `workers` contiguous partitions
///
/// Worker ids are 1-based. Every partition gets `span / workers` identifiers
/// and the last one also takes the remainder.
///
/// # Arguments
///
/// * `start` - First identifier (inclusive)
/// * `end` - Last identifier (exclusive)
/// * `workers` - Number of partitions
/// * `direction` - Walk direction; `start` must precede `end` in it
pub fn partition(
    start: i64,
    end: i64,
    workers: u32,
    direction: Direction,
) -> Result<Vec<Partition>, HarvestError> {
    if workers == 0 {
        return Err(HarvestError::InvalidRange(
            "at least one worker is required".to_string(),
        ));
    }

    if start == end || direction.has_reached(start, end) {
        return Err(HarvestError::InvalidRange(format!(
            "[{}, {}) is empty when walked {}",
            start,
            end,
            direction.as_str()
        )));
    }

    let span = start.abs_diff(end);
    if span < u64::from(workers) {
        return Err(HarvestError::InvalidRange(format!(
            "{} identifiers cannot be split across {} workers",
            span, workers
        )));
    }

    let chunk = (span / u64::from(workers)) as i64;
    let step = direction.step();

    let partitions = (0..workers)
        .map(|i| {
            let offset = i64::from(i);
            let partition_start = start + step * chunk * offset;
            let partition_end = if i + 1 == workers {
                end
            } else {
                start + step * chunk * (offset + 1)
            };
            Partition {
                worker_id: i + 1,
                start: partition_start,
                end: partition_end,
                direction,
            }
        })
        .collect();

    Ok(partitions)
}
