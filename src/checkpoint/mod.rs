//! Per-worker progress checkpoints
//!
//! Each worker owns exactly one checkpoint file in the shared checkpoint
//! directory, so no locking is needed. Files are replaced atomically (write to a
//! temporary sibling, then rename) and hold a small TOML document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while reading or writing checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable checkpoint {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Durable marker of a worker's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub worker_id: u32,

    /// Identifier the worker resumes from
    pub last_identifier: i64,

    pub timestamp: DateTime<Utc>,

    /// Set once the worker walked its whole range
    #[serde(default)]
    pub completed: bool,
}

impl Checkpoint {
    pub fn new(worker_id: u32, last_identifier: i64) -> Self {
        Self {
            worker_id,
            last_identifier,
            timestamp: Utc::now(),
            completed: false,
        }
    }

    pub fn completed(worker_id: u32, last_identifier: i64) -> Self {
        Self {
            completed: true,
            ..Self::new(worker_id, last_identifier)
        }
    }
}

/// Filesystem-backed checkpoint directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, worker_id: u32) -> PathBuf {
        self.dir
            .join(format!("worker_{}_checkpoint.toml", worker_id))
    }

    /// Older runs wrote a bare identifier to a `.txt` file
    fn legacy_path_for(&self, worker_id: u32) -> PathBuf {
        self.dir.join(format!("worker_{}_checkpoint.txt", worker_id))
    }

    /// Reads a worker's checkpoint, if one exists
    pub fn load(&self, worker_id: u32) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(worker_id);
        if path.exists() {
            return read_checkpoint(&path, worker_id).map(Some);
        }

        let legacy = self.legacy_path_for(worker_id);
        if legacy.exists() {
            return read_checkpoint(&legacy, worker_id).map(Some);
        }

        Ok(None)
    }

    /// Atomically replaces a worker's checkpoint
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(checkpoint.worker_id);
        let tmp = path.with_extension("toml.tmp");
        let content = toml::to_string(checkpoint)?;

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            worker_id = checkpoint.worker_id,
            "Saved checkpoint at identifier {}",
            checkpoint.last_identifier
        );
        Ok(())
    }
}

fn read_checkpoint(path: &Path, worker_id: u32) -> Result<Checkpoint, CheckpointError> {
    let content = fs::read_to_string(path)?;

    if let Ok(checkpoint) = toml::from_str::<Checkpoint>(&content) {
        return Ok(checkpoint);
    }

    // bare identifier
    match content.trim().parse::<i64>() {
        Ok(identifier) => {
            let timestamp = fs::metadata(path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            Ok(Checkpoint {
                worker_id,
                last_identifier: identifier,
                timestamp,
                completed: false,
            })
        }
        Err(_) => Err(CheckpointError::Parse {
            path: path.to_path_buf(),
            message: "neither a checkpoint document nor an identifier".to_string(),
        }),
    }
}
