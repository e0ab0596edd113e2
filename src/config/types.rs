use crate::worker::Direction;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Main configuration structure for Fleet-Harvest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Remote source layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Base URL of the remote source; its root path is the "home" location
    pub base_url: String,

    /// Path segment between the base URL and the identifier
    #[serde(default = "default_resource")]
    pub resource: String,

    /// Selector of the control that opens the export view
    #[serde(default = "default_export_selector")]
    pub export_selector: String,

    /// Selector that marks a loaded document
    #[serde(default = "default_body_selector")]
    pub body_selector: String,
}

impl SourceConfig {
    /// The location the source redirects to for private or missing records
    pub fn home_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}/", self.base_url.trim_end_matches('/')))
    }

    /// `{base}/{resource}/{identifier}/`
    pub fn record_url(&self, identifier: i64) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/{}/{}/",
            self.base_url.trim_end_matches('/'),
            self.resource.trim_matches('/'),
            identifier
        ))
    }
}

fn default_resource() -> String {
    "fleet".to_string()
}

fn default_export_selector() -> String {
    "button.export".to_string()
}

fn default_body_selector() -> String {
    "body".to_string()
}

/// Identifier space and per-worker loop behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Number of worker processes
    pub workers: u32,

    /// First identifier of the global range (inclusive)
    pub start: i64,

    /// Last identifier of the global range (exclusive)
    pub end: i64,

    /// Walk direction within each range
    pub direction: Direction,

    /// Records with fewer points are never persisted
    pub points_threshold: i64,

    /// Processed identifiers between scheduled session recycles
    pub session_recycle_interval: u32,

    /// Processed identifiers between checkpoint writes
    pub checkpoint_interval: u32,

    /// Consecutive non-productive identifiers before a proactive session reset
    pub max_consecutive_failures: u32,

    /// Attempts per identifier for transient step failures
    pub max_step_retries: u32,

    /// Session recreations allowed for a single identifier before giving it up
    pub max_resets_per_identifier: u32,

    /// Attempts to build a fresh session before the worker exits
    pub session_create_attempts: u32,

    /// Pause between failed session creation attempts (seconds)
    pub session_create_delay_secs: u64,

    /// Base delay between identifiers (milliseconds)
    pub request_delay_ms: u64,

    /// Extra delay per `worker_id % 3` to stagger workers (milliseconds)
    pub request_jitter_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            start: 357_110,
            end: 200_000,
            direction: Direction::Descending,
            points_threshold: 375,
            session_recycle_interval: 30,
            checkpoint_interval: 10,
            max_consecutive_failures: 5,
            max_step_retries: 3,
            max_resets_per_identifier: 5,
            session_create_attempts: 3,
            session_create_delay_secs: 30,
            request_delay_ms: 1000,
            request_jitter_ms: 500,
        }
    }
}

impl PipelineConfig {
    /// Delay applied after each attempted identifier for the given worker
    pub fn request_delay(&self, worker_id: u32) -> Duration {
        Duration::from_millis(self.request_delay_ms)
            + Duration::from_millis(self.request_jitter_ms * u64::from(worker_id % 3))
    }

    pub fn session_create_delay(&self) -> Duration {
        Duration::from_secs(self.session_create_delay_secs)
    }
}

/// Process supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SupervisorConfig {
    /// Restart workers that exit before finishing their range
    pub monitor: bool,

    /// Restarts allowed per worker
    pub max_restarts: u32,

    /// Liveness poll interval (seconds)
    pub poll_interval_secs: u64,

    /// Pause after each restart (seconds)
    pub restart_delay_secs: u64,

    /// Pause between initial worker launches (milliseconds)
    pub stagger_ms: u64,

    /// Time workers get to exit on shutdown before being killed (seconds)
    pub shutdown_grace_secs: u64,

    /// Merge all worker sinks into `output.merged-path` when the run ends
    pub merge_on_completion: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor: false,
            max_restarts: 3,
            poll_interval_secs: 30,
            restart_delay_secs: 5,
            stagger_ms: 2000,
            shutdown_grace_secs: 10,
            merge_on_completion: false,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Network reachability probing and backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConnectivityConfig {
    /// `host:port` of a stable endpoint used for raw TCP probes
    pub probe_address: String,

    /// Timeout of a single probe (milliseconds)
    pub probe_timeout_ms: u64,

    /// First backoff delay (milliseconds)
    pub initial_delay_ms: u64,

    /// Backoff cap (milliseconds)
    pub max_delay_ms: u64,

    /// Give up waiting after this many failed probes; unlimited when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_address: "8.8.8.8:53".to_string(),
            probe_timeout_ms: 3000,
            initial_delay_ms: 5000,
            max_delay_ms: 300_000,
            max_attempts: None,
        }
    }
}

/// Page session timeouts and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PageConfig {
    /// Navigation timeout (seconds)
    pub page_load_timeout_secs: u64,

    /// Wait for the record document body (seconds)
    pub element_timeout_secs: u64,

    /// Wait for the export control and export view (seconds)
    pub export_timeout_secs: u64,

    pub user_agent: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_load_timeout_secs: 30,
            element_timeout_secs: 10,
            export_timeout_secs: 8,
            user_agent: format!("fleet-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl PageConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }
}

/// Filesystem layout of sinks, checkpoints and side files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding per-worker sinks and the state subdirectories
    pub data_dir: PathBuf,

    /// Sink file name prefix; worker N writes `{prefix}_{N}.db`
    pub sink_prefix: String,

    /// Destination of the merge step
    pub merged_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("databases"),
            sink_prefix: "fleets".to_string(),
            merged_path: PathBuf::from("fleets_merged.db"),
        }
    }
}

impl OutputConfig {
    pub fn sink_path(&self, worker_id: u32) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.db", self.sink_prefix, worker_id))
    }

    /// Sinks of workers `1..=workers`
    pub fn sink_paths(&self, workers: u32) -> Vec<PathBuf> {
        (1..=workers).map(|id| self.sink_path(id)).collect()
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    /// Records that could not be written to a sink
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backup_data")
    }

    pub fn error_dir(&self) -> PathBuf {
        self.data_dir.join("errors")
    }

    /// Effective configuration handed to worker processes
    pub fn run_config_path(&self) -> PathBuf {
        self.data_dir.join("run-config.toml")
    }
}
