//! Mock device client for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::device_client::{DeviceClient, DeviceClientError, DeviceEndpoint, DeviceStatus};

/// A recorded status poll for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedPoll {
    /// Endpoint URL that was polled.
    pub url: String,
    /// When the poll happened.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Healthy(DeviceStatus),
    Failing(String),
    /// Fail `remaining` more times, then report `status`.
    FailThenSucceed {
        remaining: u32,
        reason: String,
        status: DeviceStatus,
    },
}

/// Mock implementation of the DeviceClient trait.
///
/// Behavior is keyed by endpoint URL and controllable per device:
/// - Report a fixed status
/// - Fail every poll with a given reason
/// - Fail a number of polls, then recover
///
/// Clones share state, so a test can keep a handle and flip behavior after
/// handing the client to an orchestrator.
#[derive(Debug, Clone)]
pub struct MockDeviceClient {
    behaviors: Arc<Mutex<HashMap<String, MockBehavior>>>,
    polls: Arc<Mutex<Vec<RecordedPoll>>>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl Default for MockDeviceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDeviceClient {
    /// Create a new mock device client. Unknown endpoints fail their polls.
    pub fn new() -> Self {
        Self {
            behaviors: Arc::new(Mutex::new(HashMap::new())),
            polls: Arc::new(Mutex::new(Vec::new())),
            latency: Arc::new(Mutex::new(None)),
        }
    }

    /// Make an endpoint report a default "ready" status.
    pub fn set_healthy(&self, url: &str) {
        self.set_status(
            url,
            DeviceStatus {
                state: "ready".to_string(),
                ..Default::default()
            },
        );
    }

    /// Make an endpoint report a specific status.
    pub fn set_status(&self, url: &str, status: DeviceStatus) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), MockBehavior::Healthy(status));
    }

    /// Make every poll of an endpoint fail.
    pub fn set_failing(&self, url: &str, reason: &str) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), MockBehavior::Failing(reason.to_string()));
    }

    /// Make the next `count` polls of an endpoint fail, then recover to a
    /// "ready" status.
    pub fn fail_times(&self, url: &str, count: u32, reason: &str) {
        self.behaviors.lock().unwrap().insert(
            url.to_string(),
            MockBehavior::FailThenSucceed {
                remaining: count,
                reason: reason.to_string(),
                status: DeviceStatus {
                    state: "ready".to_string(),
                    ..Default::default()
                },
            },
        );
    }

    /// Add artificial latency to every poll.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// All recorded polls, in order.
    pub fn recorded_polls(&self) -> Vec<RecordedPoll> {
        self.polls.lock().unwrap().clone()
    }

    /// Number of polls recorded for one endpoint.
    pub fn poll_count(&self, url: &str) -> usize {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.url == url)
            .count()
    }
}

#[async_trait]
impl DeviceClient for MockDeviceClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn status(&self, endpoint: &DeviceEndpoint) -> Result<DeviceStatus, DeviceClientError> {
        self.polls.lock().unwrap().push(RecordedPoll {
            url: endpoint.url.clone(),
            timestamp: Utc::now(),
        });

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut behaviors = self.behaviors.lock().unwrap();
        match behaviors.get_mut(&endpoint.url) {
            Some(MockBehavior::Healthy(status)) => Ok(status.clone()),
            Some(MockBehavior::Failing(reason)) => {
                Err(DeviceClientError::ConnectionFailed(reason.clone()))
            }
            Some(MockBehavior::FailThenSucceed {
                remaining,
                reason,
                status,
            }) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Err(DeviceClientError::ConnectionFailed(reason.clone()))
                } else {
                    Ok(status.clone())
                }
            }
            None => Err(DeviceClientError::ConnectionFailed(format!(
                "No route to device: {}",
                endpoint.url
            ))),
        }
    }
}
