//! Types for device client operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to a device.
///
/// All of these are transient from the orchestrator's point of view: they are
/// absorbed into the connection state machine, never propagated to callers.
#[derive(Debug, Error)]
pub enum DeviceClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid status payload: {0}")]
    InvalidPayload(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network address and credentials for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    /// Base URL of the controller's HTTP API (e.g. `http://voron:7125`).
    pub url: String,
    /// Optional API key sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl DeviceEndpoint {
    /// Create an endpoint with no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Status reported by a device on a successful poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Controller-reported state (e.g. "ready", "printing", "paused").
    #[serde(default)]
    pub state: String,
    /// Print job progress (0.0 - 1.0), if one is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    /// Firmware version string, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

/// Trait for device protocol backends.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Perform one status check against the device.
    async fn status(&self, endpoint: &DeviceEndpoint) -> Result<DeviceStatus, DeviceClientError>;
}
