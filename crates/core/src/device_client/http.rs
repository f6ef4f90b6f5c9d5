//! HTTP device client backend.
//!
//! Talks to printer controllers exposing a Moonraker-style HTTP API:
//! a single `GET {base}/api/v1/status` returning a JSON status document,
//! authenticated with an optional `X-Api-Key` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::types::{DeviceClient, DeviceClientError, DeviceEndpoint, DeviceStatus};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Device client backed by the controllers' HTTP status API.
pub struct HttpDeviceClient {
    client: reqwest::Client,
}

impl HttpDeviceClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Result<Self, DeviceClientError> {
        Self::with_timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    /// Create a client with an explicit request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DeviceClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceClientError::Internal(format!("Failed to build client: {}", e)))?;
        Ok(Self { client })
    }

    fn status_url(endpoint: &DeviceEndpoint) -> String {
        format!("{}/api/v1/status", endpoint.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn status(&self, endpoint: &DeviceEndpoint) -> Result<DeviceStatus, DeviceClientError> {
        let url = Self::status_url(endpoint);
        debug!("Polling device status: {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &endpoint.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeviceClientError::Timeout
            } else {
                DeviceClientError::ConnectionFailed(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(DeviceClientError::AuthenticationFailed(format!(
                    "Device returned {}",
                    response.status()
                )));
            }
            status => {
                return Err(DeviceClientError::ApiError(format!(
                    "Device returned {}",
                    status
                )));
            }
        }

        response
            .json::<DeviceStatus>()
            .await
            .map_err(|e| DeviceClientError::InvalidPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_url_strips_trailing_slash() {
        let endpoint = DeviceEndpoint::new("http://voron:7125/");
        assert_eq!(
            HttpDeviceClient::status_url(&endpoint),
            "http://voron:7125/api/v1/status"
        );
    }

    #[test]
    fn test_client_construction() {
        assert!(HttpDeviceClient::new().is_ok());
        assert!(HttpDeviceClient::with_timeout(Duration::from_secs(1)).is_ok());
    }
}
