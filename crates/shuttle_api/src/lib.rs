//! Shuttle API Library
//!
//! HTTP surface of the shuttle tracker: tracker registration and position
//! publishing, plus the observer views of position, route progress and ETA.

pub mod app_state;
pub mod config;
mod route;
mod tracker;

use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create the application router with all endpoints
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tracker", get(tracker::get_tracker_status))
        .route("/tracker/register", post(tracker::register))
        .route("/tracker/unregister", post(tracker::unregister))
        .route("/tracker/position", post(tracker::publish))
        .route("/position", get(route::get_position))
        .route("/route", get(route::get_route))
        .route("/route/progress", get(route::get_progress))
        .route("/eta", get(route::get_eta))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
