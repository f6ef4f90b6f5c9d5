//! Configuration for the task scheduler.

use serde::{Deserialize, Serialize};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum task runs executing concurrently.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Consecutive failures at which a task is suspended.
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: u32,

    /// How long shutdown waits for in-flight runs before cancelling them.
    #[serde(default = "default_grace_timeout_ms")]
    pub grace_timeout_ms: u64,

    /// Skip recurring task registration entirely; only startup tasks run.
    /// Used for fast restarts where background convergence is unnecessary.
    #[serde(default)]
    pub quick_boot: bool,

    /// Finished runs retained per task for diagnostics.
    #[serde(default = "default_recent_runs_retained")]
    pub recent_runs_retained: usize,
}

fn default_worker_pool_size() -> usize {
    8
}

fn default_failure_ceiling() -> u32 {
    5
}

fn default_grace_timeout_ms() -> u64 {
    5_000
}

fn default_recent_runs_retained() -> usize {
    20
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            failure_ceiling: default_failure_ceiling(),
            grace_timeout_ms: default_grace_timeout_ms(),
            quick_boot: false,
            recent_runs_retained: default_recent_runs_retained(),
        }
    }
}
