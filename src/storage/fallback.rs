use crate::storage::traits::SinkResult;
use crate::storage::Record;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes records a sink refused to individual TOML side files
///
/// Files are named `record_{identifier}.toml`, so a later import can replay
/// them through the normal insert-or-ignore path.
#[derive(Debug, Clone)]
pub struct FallbackWriter {
    dir: PathBuf,
}

impl FallbackWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identifier: i64) -> PathBuf {
        self.dir.join(format!("record_{}.toml", identifier))
    }

    /// Writes the record and returns the side file's path
    pub fn write(&self, record: &Record) -> SinkResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(record.identifier);
        fs::write(&path, toml::to_string(record)?)?;
        Ok(path)
    }
}
