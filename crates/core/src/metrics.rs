//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (polls, state transitions)
//! - Scheduler (task runs, suspensions)
//! - Fan-out hub (events published, subscriber overflows)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Device polls total by result.
pub static POLLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("printherd_polls_total", "Total device status polls"),
        &["result"], // "success", "failure", "timeout"
    )
    .unwrap()
});

/// Poll duration in seconds.
pub static POLL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "printherd_poll_duration_seconds",
            "Duration of device status polls",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["result"],
    )
    .unwrap()
});

/// Connection state transitions by resulting state.
pub static STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "printherd_state_transitions_total",
            "Device connection state transitions",
        ),
        &["state"], // "connecting", "connected", "degraded", "errored", "removed"
    )
    .unwrap()
});

/// Devices currently registered with the orchestrator.
pub static DEVICES_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "printherd_devices_registered",
        "Devices currently registered",
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Task runs total by result.
pub static TASK_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("printherd_task_runs_total", "Total task runs"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Tasks suspended after exceeding the failure ceiling.
pub static TASKS_SUSPENDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "printherd_tasks_suspended_total",
        "Tasks suspended after repeated failures",
    )
    .unwrap()
});

// =============================================================================
// Hub Metrics
// =============================================================================

/// Events published by topic.
pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("printherd_events_published_total", "Events published"),
        &["topic"],
    )
    .unwrap()
});

/// Events dropped from full subscriber queues.
pub static SUBSCRIBER_OVERFLOWS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "printherd_subscriber_overflows_total",
        "Events dropped from full subscriber queues",
    )
    .unwrap()
});

/// Live subscriptions across all topics.
pub static SUBSCRIPTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("printherd_subscriptions_active", "Live subscriptions").unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(POLLS_TOTAL.clone()),
        Box::new(POLL_DURATION.clone()),
        Box::new(STATE_TRANSITIONS.clone()),
        Box::new(DEVICES_REGISTERED.clone()),
        // Scheduler
        Box::new(TASK_RUNS.clone()),
        Box::new(TASKS_SUSPENDED.clone()),
        // Hub
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(SUBSCRIBER_OVERFLOWS.clone()),
        Box::new(SUBSCRIPTIONS_ACTIVE.clone()),
    ]
}
