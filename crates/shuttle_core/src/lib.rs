//! Tracker coordination and route geometry for the shuttle tracker.

mod eta;
pub mod geo;
mod models;
mod registry;
mod route;
pub mod store;

pub use crate::eta::*;
pub use crate::models::*;
pub use crate::registry::*;
pub use crate::route::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Another device is already acting as the tracker")]
    SlotConflict,
    #[error("Device {device_id} is not the active tracker")]
    NotOwner { device_id: DeviceId },
    #[error("Device {device_id} is not the active tracker, location not updated")]
    NotAuthorized { device_id: DeviceId },
    #[error("Could not encode position: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EtaError {
    #[error("Shuttle location not available")]
    MissingPosition,
    #[error("Average speed must be positive, got {speed_kmh} km/h")]
    InvalidSpeed { speed_kmh: f64 },
    #[error("Arrival {travel_seconds} s from now is out of range")]
    ArrivalOutOfRange { travel_seconds: f64 },
}
