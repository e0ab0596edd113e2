//! Record sinks
//!
//! This module handles persistence of extracted records, including:
//! - SQLite sink initialization and schema management
//! - Insert-or-ignore writes keyed on the record identifier
//! - Merging per-worker sinks into one destination
//! - Side-file fallback for records a sink could not accept

mod fallback;
mod merge;
mod schema;
mod sqlite;
mod traits;

pub use fallback::FallbackWriter;
pub use merge::{merge_sinks, MergeReport, DEFAULT_MERGE_CHUNK};
pub use sqlite::SqliteSink;
pub use traits::{Sink, SinkError, SinkResult};

#[cfg(test)]
pub(crate) use sqlite::tests::record as test_record;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One extracted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: i64,

    /// Full export text the fields were parsed from
    pub raw_payload: String,

    pub faction: String,
    pub name: String,
    pub commander: String,
    pub points: i64,
    pub origin: Origin,
    pub captured_at: DateTime<Utc>,
}

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Published on the remote source
    Shared,
    /// Created locally
    Local,
}

impl Origin {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Local => "local",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "shared" => Some(Self::Shared),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Result of an insert-or-ignore write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same identifier already existed
    Ignored,
}
