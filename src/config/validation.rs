use crate::config::types::{
    Config, ConnectivityConfig, OutputConfig, PipelineConfig, SourceConfig, SupervisorConfig,
};
use crate::worker::Direction;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_supervisor_config(&config.supervisor)?;
    validate_connectivity_config(&config.connectivity)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the remote source layout
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    let resource = config.resource.trim_matches('/');
    if resource.is_empty() || resource.contains('/') {
        return Err(ConfigError::Validation(format!(
            "resource must be a single path segment, got '{}'",
            config.resource
        )));
    }

    for (name, selector) in [
        ("export-selector", &config.export_selector),
        ("body-selector", &config.body_selector),
    ] {
        Selector::parse(selector).map_err(|_| {
            ConfigError::Validation(format!("{} is not a valid selector: '{}'", name, selector))
        })?;
    }

    Ok(())
}

/// Validates the identifier range and loop limits
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    let ordered = match config.direction {
        Direction::Descending => config.start > config.end,
        Direction::Ascending => config.start < config.end,
    };
    if !ordered {
        return Err(ConfigError::Validation(format!(
            "start {} and end {} do not form a {} range",
            config.start,
            config.end,
            config.direction.as_str()
        )));
    }

    let span = config.start.abs_diff(config.end);
    if span < u64::from(config.workers) {
        return Err(ConfigError::Validation(format!(
            "range of {} identifiers cannot be split across {} workers",
            span, config.workers
        )));
    }

    if config.points_threshold < 0 {
        return Err(ConfigError::Validation(format!(
            "points-threshold must be >= 0, got {}",
            config.points_threshold
        )));
    }

    for (name, value) in [
        ("session-recycle-interval", config.session_recycle_interval),
        ("checkpoint-interval", config.checkpoint_interval),
        ("max-consecutive-failures", config.max_consecutive_failures),
        ("max-step-retries", config.max_step_retries),
        ("session-create-attempts", config.session_create_attempts),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    Ok(())
}

fn validate_supervisor_config(config: &SupervisorConfig) -> Result<(), ConfigError> {
    if config.monitor && config.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "poll-interval-secs must be >= 1 when monitoring is enabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_connectivity_config(config: &ConnectivityConfig) -> Result<(), ConfigError> {
    match config.probe_address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => {
            return Err(ConfigError::Validation(format!(
                "probe-address must be host:port, got '{}'",
                config.probe_address
            )))
        }
    }

    if config.probe_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "probe-timeout-ms must be >= 1".to_string(),
        ));
    }

    if config.initial_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "initial-delay-ms ({}) cannot exceed max-delay-ms ({})",
            config.initial_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    if config.sink_prefix.is_empty() || config.sink_prefix.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "sink-prefix must be a plain file name prefix, got '{}'",
            config.sink_prefix
        )));
    }

    if config.merged_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "merged-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
