use serde::{Deserialize, Serialize};

use crate::{Coordinate, Station};

/// Latitude difference under which the tracker counts as being at a station.
pub const STATION_PROXIMITY_DEGREES: f64 = 0.0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationState {
    Passed,
    Current,
    Upcoming,
}

/// Indices of two adjacent stations bracketing the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationProgress {
    #[serde(flatten)]
    pub station: Station,
    pub state: StationState,
}

/// A coordinate projected onto the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteProjection {
    /// Progress from the first to the last station, in percent.
    ///
    /// `None` when there is no position or the route has no extent.
    pub progress_percent: Option<f64>,
    pub active_segment: Option<Segment>,
    pub stations: Vec<StationProgress>,
}

/// Stations ordered south to north.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    stations: Vec<Station>,
}

impl Route {
    pub fn new(mut stations: Vec<Station>) -> Self {
        stations.sort_by(|a, b| a.latitude.total_cmp(&b.latitude));
        Route { stations }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    fn bounds(&self) -> Option<(f64, f64)> {
        let first = self.stations.first()?;
        let last = self.stations.last()?;
        Some((first.latitude, last.latitude))
    }

    /// Latitude distance between the southernmost and northernmost station.
    pub fn span(&self) -> f64 {
        self.bounds().map_or(0.0, |(min, max)| max - min)
    }

    /// Project `position` onto the route.
    pub fn project(&self, position: Option<&Coordinate>) -> RouteProjection {
        let mut latitude = position.map(|p| p.latitude);
        let mut progress_percent = None;
        let mut active_segment = None;

        if let (Some(lat), Some((min, max))) = (latitude, self.bounds()) {
            let span = max - min;
            if span > 0.0 {
                let clamped = lat.clamp(min, max);
                latitude = Some(clamped);
                progress_percent = Some((clamped - min) / span * 100.0);
                active_segment = self.segment_at(clamped);
            }
        }

        let stations = self
            .stations
            .iter()
            .map(|station| StationProgress {
                station: station.clone(),
                state: latitude.map_or(StationState::Upcoming, |lat| station_state(lat, station)),
            })
            .collect();

        RouteProjection {
            progress_percent,
            active_segment,
            stations,
        }
    }

    /// The first pair of adjacent stations bracketing `latitude`.
    ///
    /// Latitudes past either end fall back to the nearest boundary segment.
    fn segment_at(&self, latitude: f64) -> Option<Segment> {
        let count = self.stations.len();
        if count < 2 {
            return None;
        }
        let found = self.stations.windows(2).position(|pair| {
            latitude >= pair[0].latitude && latitude <= pair[1].latitude
        });
        let start = match found {
            Some(start) => start,
            None if latitude >= self.stations[count - 1].latitude => count - 2,
            None => 0,
        };
        Some(Segment {
            start,
            end: start + 1,
        })
    }
}

fn station_state(latitude: f64, station: &Station) -> StationState {
    if (latitude - station.latitude).abs() < STATION_PROXIMITY_DEGREES {
        StationState::Current
    } else if latitude > station.latitude {
        StationState::Passed
    } else {
        StationState::Upcoming
    }
}
