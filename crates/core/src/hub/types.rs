//! Types for the event fan-out hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic an event is published on.
///
/// Sequence numbers are monotonic per topic; no ordering holds across topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Device connection state transitions.
    DeviceState,
    /// Periodic fleet-wide rollups for the dashboard.
    DashboardStats,
    /// Operational alerts (task suspensions, exhausted devices).
    Monitoring,
    /// Everything else (service lifecycle, ad-hoc notifications).
    Generic,
}

impl Topic {
    /// All topics, in index order.
    pub const ALL: [Topic; 4] = [
        Topic::DeviceState,
        Topic::DashboardStats,
        Topic::Monitoring,
        Topic::Generic,
    ];

    /// Returns the string representation used on the wire and in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::DeviceState => "device_state",
            Topic::DashboardStats => "dashboard_stats",
            Topic::Monitoring => "monitoring",
            Topic::Generic => "generic",
        }
    }

    /// Parse the wire representation back into a topic.
    pub fn parse(s: &str) -> Option<Topic> {
        match s {
            "device_state" => Some(Topic::DeviceState),
            "dashboard_stats" => Some(Topic::DashboardStats),
            "monitoring" => Some(Topic::Monitoring),
            "generic" => Some(Topic::Generic),
            _ => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Topic::DeviceState => 0,
            Topic::DashboardStats => 1,
            Topic::Monitoring => 2,
            Topic::Generic => 3,
        }
    }
}

/// An immutable fact published to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Topic this event was published on.
    pub topic: Topic,
    /// Monotonic per-topic sequence number (starts at 1).
    pub sequence: u64,
    /// Opaque JSON payload; consumers interpret it by topic.
    pub payload: serde_json::Value,
    /// When the event was published.
    pub emitted_at: DateTime<Utc>,
}

/// One unit delivered to a subscriber.
///
/// Consumers rely on sequence numbers for gap detection: an `Overflow` or
/// `ReplayGap` marker means events were lost, never silently hidden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    /// A live or replayed event.
    Event(Event),
    /// The subscriber's queue overflowed; `missed` events were dropped
    /// before the next delivered event.
    Overflow { topic: Topic, missed: u64 },
    /// Replay was requested from `requested` but the buffer no longer holds
    /// it; delivery resumes at `resumed_from`.
    ReplayGap {
        topic: Topic,
        requested: u64,
        resumed_from: u64,
    },
}
