//! Configuration module for Fleet-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section except `[source]` may be omitted; missing values fall back to
//! the defaults documented on each field.
//!
//! # Example
//!
//! ```no_run
//! use fleet_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Running {} workers", config.pipeline.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ConnectivityConfig, OutputConfig, PageConfig, PipelineConfig, SourceConfig,
    SupervisorConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, write_config};
pub use validation::validate;
