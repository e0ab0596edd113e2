//! Fleet-Harvest: a resilient, partitioned record extraction pipeline
//!
//! A supervisor splits a numeric identifier space into contiguous ranges and
//! runs one isolated worker process per range. Each worker walks its range
//! against a remote source, extracts one structured record per identifier and
//! persists it into its own SQLite sink, surviving network outages, session
//! crashes and process death through checkpoints and bounded restarts.

pub mod checkpoint;
pub mod config;
pub mod connectivity;
pub mod extract;
pub mod output;
pub mod page;
pub mod shutdown;
pub mod storage;
pub mod supervisor;
pub mod worker;

use thiserror::Error;

/// Main error type for Fleet-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] storage::SinkError),

    #[error("Page client error: {0}")]
    Page(#[from] page::PageError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] supervisor::SupervisorError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Connectivity not restored (worker {worker_id}, identifier {identifier})")]
    ConnectivityExhausted { worker_id: u32, identifier: i64 },

    #[error("Could not create a page session for worker {worker_id} after {attempts} attempts")]
    SessionUnavailable { worker_id: u32, attempts: u32 },

    #[error("Invalid identifier range: {0}")]
    InvalidRange(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Fleet-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use extract::{Extractor, Outcome, SkipReason};
pub use storage::{Origin, Record};
pub use worker::{Direction, WorkerRange};
