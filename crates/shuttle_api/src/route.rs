use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shuttle_core::{Coordinate, EtaError, RouteProjection, Station, TrackedPosition};

use crate::ErrorResponse;
use crate::app_state::AppState;
use crate::config::MapConfig;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    /// `None` while no tracker is broadcasting
    pub position: Option<TrackedPosition>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    pub name: String,
    /// Stations ordered by latitude
    pub stations: Vec<Station>,
    pub map: MapConfig,
    pub poll_interval_ms: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaResponse {
    pub distance_km: f64,
    pub travel_minutes: f64,
    pub arrival: DateTime<Utc>,
    /// Arrival in the route's time zone, e.g. `03:42 PM`
    pub arrival_clock: String,
}

/// Get the latest tracked position
pub async fn get_position(State(app_state): State<AppState>) -> Json<PositionResponse> {
    Json(PositionResponse {
        position: app_state.registry().fetch(),
    })
}

/// Get the route layout and map defaults
pub async fn get_route(State(app_state): State<AppState>) -> Json<RouteInfo> {
    tracing::info!("Getting route");
    Json(RouteInfo {
        name: app_state.config.route_name.clone(),
        stations: app_state.engine.route().stations().to_vec(),
        map: app_state.config.map.clone(),
        poll_interval_ms: app_state.config.poll_interval_ms,
    })
}

/// Get the tracked position projected onto the route
pub async fn get_progress(State(app_state): State<AppState>) -> Json<RouteProjection> {
    Json(app_state.engine.progress())
}

/// Estimate when the shuttle reaches the given coordinate
pub async fn get_eta(
    State(app_state): State<AppState>,
    Query(query): Query<EtaQuery>,
) -> impl IntoResponse {
    let own = Coordinate::new(query.latitude, query.longitude);
    if !own.is_valid() {
        return invalid_coordinate(&own);
    }

    match app_state.engine.eta(&own, Utc::now()) {
        Ok(eta) => (
            StatusCode::OK,
            Json(EtaResponse {
                distance_km: eta.distance_km,
                travel_minutes: eta.travel_minutes(),
                arrival_clock: eta.arrival_clock(app_state.config.time_zone),
                arrival: eta.arrival,
            }),
        )
            .into_response(),
        Err(error) => {
            let status = match error {
                EtaError::MissingPosition => StatusCode::NOT_FOUND,
                EtaError::InvalidSpeed { .. } | EtaError::ArrivalOutOfRange { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (
                status,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// 400 response for a coordinate outside the valid range
pub(crate) fn invalid_coordinate(coordinate: &Coordinate) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!(
                "Invalid coordinate ({}, {})",
                coordinate.latitude, coordinate.longitude
            ),
        }),
    )
        .into_response()
}
