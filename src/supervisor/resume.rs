//! Resume point resolution

use crate::checkpoint::CheckpointStore;
use crate::storage::{Sink, SqliteSink};
use crate::worker::Partition;
use std::path::Path;

/// Where a worker picks its partition back up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// From the identifier stored in the worker's checkpoint
    Checkpoint(i64),
    /// From the extreme identifier already in the worker's sink
    Sink(i64),
    /// Nothing recorded yet
    PartitionStart(i64),
    /// The checkpoint marks the whole partition as walked
    Completed,
}

impl ResumePoint {
    /// Identifier to launch the worker at, if any
    pub fn start(&self) -> Option<i64> {
        match self {
            Self::Checkpoint(id) | Self::Sink(id) | Self::PartitionStart(id) => Some(*id),
            Self::Completed => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Checkpoint(id) => format!("checkpoint at {}", id),
            Self::Sink(id) => format!("sink progress at {}", id),
            Self::PartitionStart(id) => format!("partition start {}", id),
            Self::Completed => "completed".to_string(),
        }
    }
}

/// Picks the start identifier for a partition
///
/// A checkpoint inside the partition wins; a completed one at the partition's
/// final identifier means there is nothing left to launch. Otherwise the sink's
/// highest identifier inside the partition is used, and finally the partition
/// start. Unreadable checkpoints and sinks are logged and treated as absent.
///
/// # Arguments
///
/// * `partition` - The worker's share of the identifier space
/// * `checkpoints` - Checkpoint directory
/// * `sink_path` - The worker's sink file
pub fn resolve_resume(
    partition: &Partition,
    checkpoints: &CheckpointStore,
    sink_path: &Path,
) -> ResumePoint {
    let worker_id = partition.worker_id;

    match checkpoints.load(worker_id) {
        Ok(Some(checkpoint)) if partition.contains(checkpoint.last_identifier) => {
            if checkpoint.completed && checkpoint.last_identifier == partition.final_identifier() {
                return ResumePoint::Completed;
            }
            return ResumePoint::Checkpoint(checkpoint.last_identifier);
        }
        Ok(Some(checkpoint)) => {
            tracing::warn!(
                "Ignoring checkpoint {} for worker {}: outside [{}, {})",
                checkpoint.last_identifier,
                worker_id,
                partition.start,
                partition.end
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Ignoring checkpoint for worker {}: {}", worker_id, e);
        }
    }

    if sink_path.exists() {
        let (low, high) = partition.bounds();
        let found = SqliteSink::open_existing(sink_path)
            .and_then(|sink| sink.max_identifier_between(low, high));
        match found {
            Ok(Some(identifier)) => return ResumePoint::Sink(identifier),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    "Could not read progress from {}: {}",
                    sink_path.display(),
                    e
                );
            }
        }
    }

    ResumePoint::PartitionStart(partition.start)
}
