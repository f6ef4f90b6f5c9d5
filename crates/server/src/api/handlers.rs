use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use printherd_core::Topic;

use crate::metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: i64,
    pub devices_total: usize,
    pub devices_by_state: BTreeMap<String, usize>,
    pub tasks_total: usize,
    pub tasks_suspended: usize,
    pub quick_boot: bool,
    pub subscribers_by_topic: BTreeMap<String, usize>,
}

/// Fleet-wide status rollup for the dashboard.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let devices = state.orchestrator().snapshot_all().await;
    let mut devices_by_state = BTreeMap::new();
    for snapshot in &devices {
        *devices_by_state
            .entry(snapshot.state.as_str().to_string())
            .or_insert(0) += 1;
    }

    let tasks = state.scheduler().snapshot_all();
    let tasks_suspended = tasks.iter().filter(|t| t.suspended).count();

    let mut subscribers_by_topic = BTreeMap::new();
    for topic in Topic::ALL {
        subscribers_by_topic.insert(
            topic.as_str().to_string(),
            state.hub().subscriber_count(topic),
        );
    }

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (chrono::Utc::now() - state.started_at()).num_seconds(),
        devices_total: devices.len(),
        devices_by_state,
        tasks_total: tasks.len(),
        tasks_suspended,
        quick_boot: state.config().scheduler.quick_boot,
        subscribers_by_topic,
    })
}

/// Prometheus text exposition.
pub async fn get_metrics() -> String {
    metrics::render()
}
