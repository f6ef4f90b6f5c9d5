//! Device API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use printherd_core::{ConnectionSnapshot, DeviceEndpoint, OrchestratorError};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for registering a device
#[derive(Debug, Deserialize)]
pub struct RegisterDeviceBody {
    pub id: String,
    pub url: String,
    pub api_key: Option<String>,
}

/// Response for a single device
#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub device_id: String,
    pub url: String,
    pub state: String,
    pub consecutive_failures: u32,
    pub last_success_at: Option<String>,
    pub backoff_until: Option<String>,
    pub last_error: Option<String>,
}

impl From<ConnectionSnapshot> for DeviceResponse {
    fn from(snapshot: ConnectionSnapshot) -> Self {
        Self {
            device_id: snapshot.device_id,
            url: snapshot.endpoint.url,
            state: snapshot.state.as_str().to_string(),
            consecutive_failures: snapshot.consecutive_failures,
            last_success_at: snapshot.last_success_at.map(|t| t.to_rfc3339()),
            backoff_until: snapshot.backoff_until.map(|t| t.to_rfc3339()),
            last_error: snapshot.last_error,
        }
    }
}

/// Response for listing devices
#[derive(Debug, Serialize)]
pub struct ListDevicesResponse {
    pub devices: Vec<DeviceResponse>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct DeviceErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<DeviceErrorResponse>) {
    (
        status,
        Json(DeviceErrorResponse {
            error: error.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// List all registered devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<ListDevicesResponse> {
    let devices: Vec<DeviceResponse> = state
        .orchestrator()
        .snapshot_all()
        .await
        .into_iter()
        .map(DeviceResponse::from)
        .collect();
    let total = devices.len();
    Json(ListDevicesResponse { devices, total })
}

/// Register a new device
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterDeviceBody>,
) -> Result<(StatusCode, Json<DeviceResponse>), impl IntoResponse> {
    if body.id.is_empty() || body.url.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Device id and url must be non-empty",
        ));
    }

    let mut endpoint = DeviceEndpoint::new(&body.url);
    endpoint.api_key = body.api_key;

    match state
        .orchestrator()
        .register_device(body.id.clone(), endpoint)
        .await
    {
        Ok(()) => {
            // Registration succeeded, so the snapshot must exist.
            match state.orchestrator().snapshot(&body.id).await {
                Ok(snapshot) => Ok((StatusCode::CREATED, Json(DeviceResponse::from(snapshot)))),
                Err(e) => Err(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    e.to_string(),
                )),
            }
        }
        Err(e @ OrchestratorError::DuplicateDevice(_)) => {
            Err(error_response(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        )),
    }
}

/// Get one device
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceResponse>, impl IntoResponse> {
    match state.orchestrator().snapshot(&id).await {
        Ok(snapshot) => Ok(Json(DeviceResponse::from(snapshot))),
        Err(e @ OrchestratorError::UnknownDevice(_)) => {
            Err(error_response(StatusCode::NOT_FOUND, e.to_string()))
        }
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        )),
    }
}

/// Deregister a device. A no-op for unknown ids.
pub async fn deregister_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    state.orchestrator().deregister_device(&id).await;
    StatusCode::NO_CONTENT
}

/// Trigger an immediate poll of one device.
///
/// Poll failures surface as device state, not as an error status; only an
/// unknown id fails.
pub async fn poll_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceResponse>, impl IntoResponse> {
    match state.orchestrator().poll_once(&id).await {
        Ok(snapshot) => Ok(Json(DeviceResponse::from(snapshot))),
        Err(e @ OrchestratorError::UnknownDevice(_)) => {
            Err(error_response(StatusCode::NOT_FOUND, e.to_string()))
        }
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
        )),
    }
}
