//! Prometheus metrics for the server surface.
//!
//! Core component metrics (polls, task runs, hub traffic) live in
//! `printherd_core::metrics`; this module adds the WebSocket connection
//! metrics and assembles the shared registry behind `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Total WebSocket connections accepted.
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "printherd_ws_connections_total",
        "Total WebSocket connections accepted",
    )
    .unwrap()
});

/// WebSocket connections currently open.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "printherd_ws_connections_active",
        "WebSocket connections currently open",
    )
    .unwrap()
});

/// Messages sent to WebSocket clients, by delivery kind.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "printherd_ws_messages_sent_total",
            "Messages sent to WebSocket clients",
        ),
        &["kind"], // "event", "overflow", "replay_gap"
    )
    .unwrap()
});

// =============================================================================
// Registry assembly
// =============================================================================

fn register_metrics(registry: &Registry) {
    let mut collectors = printherd_core::metrics::all_metrics();
    collectors.push(Box::new(WS_CONNECTIONS_TOTAL.clone()));
    collectors.push(Box::new(WS_CONNECTIONS_ACTIVE.clone()));
    collectors.push(Box::new(WS_MESSAGES_SENT.clone()));

    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
