//! Types for the connection orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device_client::DeviceEndpoint;

/// Errors returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Device already registered: {0}")]
    DuplicateDevice(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}

/// Connection state of one device.
///
/// `Degraded` and `Errored` differ only by failure count; both keep
/// attempting reconnection, `Errored` at an exponentially growing backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
    Errored,
    Removed,
}

impl ConnectionState {
    /// String representation used in events and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Errored => "errored",
            ConnectionState::Removed => "removed",
        }
    }
}

/// Immutable view of one device's connection record.
///
/// Only the device's own polling loop mutates the live record; everything
/// else reads through snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub device_id: String,
    pub endpoint: DeviceEndpoint,
    pub state: ConnectionState,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Compute the state a failing poll transitions to.
///
/// `failures` is the consecutive failure count including the poll that just
/// failed. Past the ceiling the device is Errored; below it, a device that
/// was never connected keeps trying to connect, while a previously connected
/// device is marked degraded.
pub(crate) fn state_after_failure(
    current: ConnectionState,
    failures: u32,
    ceiling: u32,
) -> ConnectionState {
    if failures >= ceiling {
        return ConnectionState::Errored;
    }
    match current {
        ConnectionState::Disconnected | ConnectionState::Connecting => ConnectionState::Connecting,
        ConnectionState::Connected | ConnectionState::Degraded => ConnectionState::Degraded,
        ConnectionState::Errored => ConnectionState::Errored,
        ConnectionState::Removed => ConnectionState::Removed,
    }
}

/// Compute the reconnect backoff for an Errored device.
///
/// Grows by `growth` for each failure past the ceiling, capped at `max_ms`.
pub(crate) fn backoff_ms(
    failures: u32,
    ceiling: u32,
    base_ms: u64,
    growth: f64,
    max_ms: u64,
) -> u64 {
    let over = failures.saturating_sub(ceiling);
    let delay = base_ms as f64 * growth.powi(over as i32);
    if delay >= max_ms as f64 {
        max_ms
    } else {
        delay as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_below_ceiling_keeps_connecting() {
        assert_eq!(
            state_after_failure(ConnectionState::Disconnected, 1, 5),
            ConnectionState::Connecting
        );
        assert_eq!(
            state_after_failure(ConnectionState::Connecting, 4, 5),
            ConnectionState::Connecting
        );
    }

    #[test]
    fn test_failure_after_connected_degrades() {
        assert_eq!(
            state_after_failure(ConnectionState::Connected, 1, 5),
            ConnectionState::Degraded
        );
        assert_eq!(
            state_after_failure(ConnectionState::Degraded, 4, 5),
            ConnectionState::Degraded
        );
    }

    #[test]
    fn test_ceiling_reaches_errored_from_any_state() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Degraded,
            ConnectionState::Errored,
        ] {
            assert_eq!(state_after_failure(state, 5, 5), ConnectionState::Errored);
        }
    }

    #[test]
    fn test_backoff_grows_exponentially_and_caps() {
        assert_eq!(backoff_ms(5, 5, 2_000, 2.0, 300_000), 2_000);
        assert_eq!(backoff_ms(6, 5, 2_000, 2.0, 300_000), 4_000);
        assert_eq!(backoff_ms(8, 5, 2_000, 2.0, 300_000), 16_000);
        assert_eq!(backoff_ms(20, 5, 2_000, 2.0, 300_000), 300_000);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
        assert_eq!(ConnectionState::Errored.as_str(), "errored");
    }
}
