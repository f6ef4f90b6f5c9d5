use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{devices, handlers, tasks, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::get_status))
        // Devices
        .route("/devices", get(devices::list_devices))
        .route("/devices", post(devices::register_device))
        .route("/devices/{id}", get(devices::get_device))
        .route("/devices/{id}", delete(devices::deregister_device))
        .route("/devices/{id}/poll", post(devices::poll_device))
        // Tasks
        .route("/tasks", get(tasks::list_tasks));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
