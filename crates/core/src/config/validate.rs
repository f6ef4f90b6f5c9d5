use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Device ids are unique and non-empty, URLs non-empty
/// - Server port is not 0
/// - Orchestrator backoff growth >= 1.0 and timeout > 0
/// - Hub capacities are nonzero
/// - Scheduler intervals and pool size are sane
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }
    if config.server.stats_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "server.stats_interval_ms cannot be 0".to_string(),
        ));
    }
    if config.server.fleet_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "server.fleet_poll_interval_ms cannot be 0".to_string(),
        ));
    }

    // Device validation
    let mut seen = HashSet::new();
    for device in &config.devices {
        if device.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "device id cannot be empty".to_string(),
            ));
        }
        if device.url.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "device {} has an empty url",
                device.id
            )));
        }
        if !seen.insert(device.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate device id: {}",
                device.id
            )));
        }
    }

    // Orchestrator validation
    if config.orchestrator.poll_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.poll_timeout_ms cannot be 0".to_string(),
        ));
    }
    if config.orchestrator.failure_ceiling == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.failure_ceiling cannot be 0".to_string(),
        ));
    }
    if config.orchestrator.backoff_growth < 1.0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.backoff_growth must be >= 1.0".to_string(),
        ));
    }
    if config.orchestrator.backoff_max_ms < config.orchestrator.backoff_base_ms {
        return Err(ConfigError::ValidationError(
            "orchestrator.backoff_max_ms must be >= backoff_base_ms".to_string(),
        ));
    }

    // Scheduler validation
    if config.scheduler.worker_pool_size == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.worker_pool_size cannot be 0".to_string(),
        ));
    }
    if config.scheduler.failure_ceiling == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.failure_ceiling cannot be 0".to_string(),
        ));
    }

    // Hub validation
    if config.hub.subscriber_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "hub.subscriber_capacity cannot be 0".to_string(),
        ));
    }
    if config.hub.replay_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "hub.replay_capacity cannot be 0".to_string(),
        ));
    }

    Ok(())
}
