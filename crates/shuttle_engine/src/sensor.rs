use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shuttle_core::Coordinate;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Upper bound on the wait for a single fix.
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Prompt,
    Granted,
    Denied,
    Unavailable,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Geolocation is unavailable on this device")]
    Unavailable,
    #[error("Timed out waiting for a location fix")]
    Timeout,
}

impl SensorError {
    /// Whether watching has to stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SensorError::PermissionDenied | SensorError::Unavailable)
    }
}

/// A source of location fixes, such as a platform geolocation service.
pub trait LocationSensor: Send {
    fn permission(&self) -> PermissionState;

    /// Wait for the next fix.
    fn next_fix(&mut self) -> impl Future<Output = Result<Coordinate, SensorError>> + Send;
}

/// Watches a sensor, bounding every wait for a fix by a timeout and keeping
/// the latest fix around.
pub struct GeolocationWatcher<S> {
    sensor: S,
    timeout: Duration,
    last_fix: Option<Coordinate>,
}

impl<S: LocationSensor> GeolocationWatcher<S> {
    pub fn new(sensor: S) -> Self {
        GeolocationWatcher {
            sensor,
            timeout: DEFAULT_FIX_TIMEOUT,
            last_fix: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn permission(&self) -> PermissionState {
        self.sensor.permission()
    }

    pub fn last_fix(&self) -> Option<&Coordinate> {
        self.last_fix.as_ref()
    }

    /// Fail early when the sensor can not deliver fixes at all.
    pub fn check_permission(&self) -> Result<(), SensorError> {
        match self.permission() {
            PermissionState::Denied => Err(SensorError::PermissionDenied),
            PermissionState::Unavailable => Err(SensorError::Unavailable),
            PermissionState::Prompt | PermissionState::Granted => Ok(()),
        }
    }

    pub async fn next_fix(&mut self) -> Result<Coordinate, SensorError> {
        self.check_permission()?;
        let fix = tokio::time::timeout(self.timeout, self.sensor.next_fix())
            .await
            .map_err(|_| SensorError::Timeout)??;
        self.last_fix = Some(fix);
        Ok(fix)
    }
}

/// Sensor fed through a channel by a platform adapter.
pub struct ChannelSensor {
    fixes: mpsc::Receiver<Result<Coordinate, SensorError>>,
    permission: watch::Receiver<PermissionState>,
}

/// Sending half of a [`ChannelSensor`].
pub struct SensorFeed {
    fixes: mpsc::Sender<Result<Coordinate, SensorError>>,
    permission: watch::Sender<PermissionState>,
}

impl ChannelSensor {
    pub fn new(capacity: usize, permission: PermissionState) -> (ChannelSensor, SensorFeed) {
        let (fixes_tx, fixes_rx) = mpsc::channel(capacity);
        let (permission_tx, permission_rx) = watch::channel(permission);
        (
            ChannelSensor {
                fixes: fixes_rx,
                permission: permission_rx,
            },
            SensorFeed {
                fixes: fixes_tx,
                permission: permission_tx,
            },
        )
    }
}

impl LocationSensor for ChannelSensor {
    fn permission(&self) -> PermissionState {
        *self.permission.borrow()
    }

    async fn next_fix(&mut self) -> Result<Coordinate, SensorError> {
        // Every feed dropped: the platform stopped reporting for good.
        self.fixes.recv().await.unwrap_or(Err(SensorError::Unavailable))
    }
}

impl SensorFeed {
    /// Returns `false` once the sensor is gone.
    pub async fn push(&self, fix: Coordinate) -> bool {
        self.fixes.send(Ok(fix)).await.is_ok()
    }

    pub async fn fail(&self, error: SensorError) -> bool {
        self.fixes.send(Err(error)).await.is_ok()
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.permission.send_replace(permission);
    }
}

/// Replays a fixed list of readings, one per `interval`.
///
/// Once the script is exhausted no further fix ever arrives.
pub struct ScriptedSensor {
    readings: VecDeque<Result<Coordinate, SensorError>>,
    interval: Duration,
    permission: PermissionState,
}

impl ScriptedSensor {
    pub fn new(readings: impl IntoIterator<Item = Result<Coordinate, SensorError>>) -> Self {
        ScriptedSensor {
            readings: readings.into_iter().collect(),
            interval: Duration::from_secs(1),
            permission: PermissionState::Granted,
        }
    }

    pub fn from_fixes(fixes: impl IntoIterator<Item = Coordinate>) -> Self {
        Self::new(fixes.into_iter().map(Ok))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = permission;
        self
    }
}

impl LocationSensor for ScriptedSensor {
    fn permission(&self) -> PermissionState {
        self.permission
    }

    async fn next_fix(&mut self) -> Result<Coordinate, SensorError> {
        tokio::time::sleep(self.interval).await;
        match self.readings.pop_front() {
            Some(reading) => reading,
            None => std::future::pending().await,
        }
    }
}
