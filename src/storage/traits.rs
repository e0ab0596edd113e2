//! Sink trait and error types

use crate::storage::{InsertOutcome, Record};
use thiserror::Error;

/// Errors that can occur during sink operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record {identifier}: {message}")]
    CorruptRecord { identifier: i64, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Durable record store with upsert-or-ignore semantics
///
/// The unique identifier is the only deduplication key: inserting a record
/// whose identifier is already present leaves the stored record untouched.
pub trait Sink {
    /// Returns true if a record with this identifier is stored
    fn contains(&self, identifier: i64) -> SinkResult<bool>;

    /// Inserts a record unless its identifier is already present
    fn insert_or_ignore(&mut self, record: &Record) -> SinkResult<InsertOutcome>;

    /// Gets a stored record by identifier
    fn get(&self, identifier: i64) -> SinkResult<Option<Record>>;

    /// Highest stored identifier
    fn max_identifier(&self) -> SinkResult<Option<i64>>;

    /// Lowest stored identifier
    fn min_identifier(&self) -> SinkResult<Option<i64>>;

    /// Highest stored identifier within `[low, high]`
    fn max_identifier_between(&self, low: i64, high: i64) -> SinkResult<Option<i64>>;

    /// Number of stored records
    fn count(&self) -> SinkResult<u64>;

    /// Record counts per faction, largest first
    fn faction_counts(&self) -> SinkResult<Vec<(String, u64)>>;

    /// Lowest and highest stored points
    fn points_range(&self) -> SinkResult<Option<(i64, i64)>>;
}
