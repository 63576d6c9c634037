//! Device-side coordination: broadcasting as the tracker, following the
//! tracked position and estimating arrival.

mod broadcaster;
mod poller;
pub mod sensor;

pub use crate::broadcaster::*;
pub use crate::poller::*;

use std::time::Duration;

use chrono::{DateTime, Utc};
use shuttle_core::{
    Coordinate, DEFAULT_AVERAGE_SPEED_KMH, DeviceId, EtaError, EtaEstimate, Route,
    RouteProjection, TrackerRegistry,
};

use crate::sensor::{GeolocationWatcher, LocationSensor};

/// Entry point tying the registry, the route and the arrival estimate
/// together for one client.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: TrackerRegistry,
    route: Route,
    average_speed_kmh: f64,
    poll_interval: Duration,
}

impl Engine {
    pub fn new(registry: TrackerRegistry, route: Route) -> Self {
        Engine {
            registry,
            route,
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_average_speed(mut self, average_speed_kmh: f64) -> Self {
        self.average_speed_kmh = average_speed_kmh;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.average_speed_kmh
    }

    /// Current tracked position projected onto the route.
    pub fn progress(&self) -> RouteProjection {
        let position = self.registry.fetch();
        self.route.project(position.as_ref().map(|p| &p.coordinate))
    }

    /// Arrival estimate of the shuttle at `own`.
    pub fn eta(&self, own: &Coordinate, now: DateTime<Utc>) -> Result<EtaEstimate, EtaError> {
        let position = self.registry.fetch();
        shuttle_core::estimate(
            own,
            position.as_ref().map(|p| &p.coordinate),
            self.average_speed_kmh,
            now,
        )
    }

    /// Register `device_id` as tracker and start publishing the fixes of `watcher`.
    pub fn start_broadcast<S: LocationSensor + 'static>(
        &self,
        device_id: DeviceId,
        token: &str,
        watcher: GeolocationWatcher<S>,
    ) -> Result<BroadcastHandle, BroadcastError> {
        Ok(Broadcaster::register(self.registry.clone(), device_id, token, watcher)?.spawn())
    }

    /// Start following the tracked position.
    pub fn watch_position(&self) -> PollerHandle {
        PositionPoller::new(self.registry.clone())
            .with_interval(self.poll_interval)
            .spawn()
    }
}
