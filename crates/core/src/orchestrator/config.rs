//! Configuration for the connection orchestrator.

use serde::{Deserialize, Serialize};

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Polling interval per device in milliseconds. 0 disables the
    /// background polling loops (polls happen only on demand).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout for a single status check in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Consecutive failures at which a device transitions to Errored.
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: u32,

    /// Base reconnect backoff for Errored devices in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Multiplier applied to the backoff for each failure past the ceiling.
    #[serde(default = "default_backoff_growth")]
    pub backoff_growth: f64,

    /// Upper bound on the reconnect backoff in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_poll_timeout_ms() -> u64 {
    5_000
}

fn default_failure_ceiling() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_growth() -> f64 {
    2.0
}

fn default_backoff_max_ms() -> u64 {
    300_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            failure_ceiling: default_failure_ceiling(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_growth: default_backoff_growth(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_interval_ms, 10_000);
        assert_eq!(config.failure_ceiling, 5);
        assert_eq!(config.backoff_max_ms, 300_000);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            poll_interval_ms = 500
            failure_ceiling = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.failure_ceiling, 3);
        assert_eq!(config.backoff_growth, 2.0);
    }
}
