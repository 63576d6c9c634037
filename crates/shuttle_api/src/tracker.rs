use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use shuttle_core::{Coordinate, DeviceId, RegistryError, TrackedPosition};

use crate::ErrorResponse;
use crate::app_state::AppState;
use crate::route::invalid_coordinate;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Generated by the server when absent
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    pub token: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    pub device_id: DeviceId,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub device_id: DeviceId,
    pub coordinate: Coordinate,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerResponse {
    pub device_id: DeviceId,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub position: TrackedPosition,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerQuery {
    pub device_id: Option<DeviceId>,
}

/// Whether anyone is tracking. The holder's id is never disclosed.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub active: bool,
    /// Whether the queried device holds the slot
    pub owned: bool,
}

fn registry_error_to_response(error: RegistryError) -> impl IntoResponse {
    tracing::warn!("Tracker request rejected: {}", error);
    let status = match error {
        RegistryError::InvalidToken => StatusCode::UNAUTHORIZED,
        RegistryError::SlotConflict => StatusCode::CONFLICT,
        RegistryError::NotOwner { .. } | RegistryError::NotAuthorized { .. } => {
            StatusCode::FORBIDDEN
        }
        RegistryError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Register a device as the active tracker
pub async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    let device_id = payload.device_id.unwrap_or_else(DeviceId::generate);
    tracing::info!("Registering tracker {}", device_id);
    match app_state.registry().register(&device_id, &payload.token) {
        Ok(()) => (
            StatusCode::OK,
            Json(TrackerResponse {
                device_id,
                message: "Device successfully registered as tracker.".into(),
            }),
        )
            .into_response(),
        Err(error) => registry_error_to_response(error).into_response(),
    }
}

/// Release the tracker slot
pub async fn unregister(
    State(app_state): State<AppState>,
    Json(payload): Json<UnregisterRequest>,
) -> impl IntoResponse {
    tracing::info!("Unregistering tracker {}", payload.device_id);
    match app_state.registry().unregister(&payload.device_id) {
        Ok(()) => (
            StatusCode::OK,
            Json(TrackerResponse {
                device_id: payload.device_id,
                message: "Device unregistered. Tracking stopped.".into(),
            }),
        )
            .into_response(),
        Err(error) => registry_error_to_response(error).into_response(),
    }
}

/// Publish the tracker's current location
pub async fn publish(
    State(app_state): State<AppState>,
    Json(payload): Json<PublishRequest>,
) -> impl IntoResponse {
    tracing::debug!("Position update from {}", payload.device_id);
    if !payload.coordinate.is_valid() {
        tracing::warn!("Rejected out of range fix from {}", payload.device_id);
        return invalid_coordinate(&payload.coordinate);
    }
    match app_state
        .registry()
        .publish(&payload.device_id, payload.coordinate)
    {
        Ok(position) => (StatusCode::OK, Json(PublishResponse { position })).into_response(),
        Err(error) => registry_error_to_response(error).into_response(),
    }
}

/// Report whether a tracker is active
pub async fn get_tracker_status(
    State(app_state): State<AppState>,
    Query(query): Query<TrackerQuery>,
) -> Json<TrackerStatus> {
    let active = app_state.registry().active_tracker();
    Json(TrackerStatus {
        owned: active.is_some() && active == query.device_id,
        active: active.is_some(),
    })
}
