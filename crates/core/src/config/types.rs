//! Configuration types.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::device_client::DeviceEndpoint;
use crate::hub::HubConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::scheduler::SchedulerConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Devices registered with the orchestrator at startup.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub hub: HubConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Interval of the built-in dashboard-stats job in milliseconds.
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    /// Interval of the built-in fleet-poll job in milliseconds. Only used
    /// when per-device polling loops are disabled (poll_interval_ms = 0).
    #[serde(default = "default_fleet_poll_interval_ms")]
    pub fleet_poll_interval_ms: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_stats_interval_ms() -> u64 {
    30_000
}

fn default_fleet_poll_interval_ms() -> u64 {
    15_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stats_interval_ms: default_stats_interval_ms(),
            fleet_poll_interval_ms: default_fleet_poll_interval_ms(),
        }
    }
}

/// One device entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device id, e.g. `voron-01`.
    pub id: String,

    /// Base URL of the device's controller API.
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl DeviceConfig {
    /// The endpoint the device client will poll.
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint {
            url: self.url.clone(),
            api_key: self.api_key.clone(),
        }
    }
}
