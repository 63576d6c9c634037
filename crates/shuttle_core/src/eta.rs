use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Coordinate, EtaError, geo};

/// Assumed average shuttle speed.
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 25.0;

/// Straight-line arrival estimate of the shuttle at an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaEstimate {
    pub distance_km: f64,
    pub travel_seconds: f64,
    pub arrival: DateTime<Utc>,
}

impl EtaEstimate {
    pub fn travel_minutes(&self) -> f64 {
        self.travel_seconds / 60.0
    }

    /// Arrival rendered as a wall clock time, e.g. `03:42 PM`.
    pub fn arrival_clock(&self, time_zone: Tz) -> String {
        self.arrival
            .with_timezone(&time_zone)
            .format("%I:%M %p")
            .to_string()
    }
}

/// Estimate when the shuttle at `tracker` reaches `own`.
///
/// Distance is the great-circle distance, not the distance along the route.
pub fn estimate(
    own: &Coordinate,
    tracker: Option<&Coordinate>,
    average_speed_kmh: f64,
    now: DateTime<Utc>,
) -> Result<EtaEstimate, EtaError> {
    if average_speed_kmh.is_nan() || average_speed_kmh <= 0.0 {
        return Err(EtaError::InvalidSpeed {
            speed_kmh: average_speed_kmh,
        });
    }
    let tracker = tracker.ok_or(EtaError::MissingPosition)?;

    let distance_km = geo::distance_km(own, tracker);
    let travel_seconds = distance_km / average_speed_kmh * 3600.0;
    if !travel_seconds.is_finite() {
        return Err(EtaError::ArrivalOutOfRange { travel_seconds });
    }
    let arrival = TimeDelta::try_milliseconds((travel_seconds * 1000.0).round() as i64)
        .and_then(|travel| now.checked_add_signed(travel))
        .ok_or(EtaError::ArrivalOutOfRange { travel_seconds })?;

    Ok(EtaEstimate {
        distance_km,
        travel_seconds,
        arrival,
    })
}
