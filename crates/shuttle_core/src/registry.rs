use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::store::{KeyValueStore, StoreChange};
use crate::{Coordinate, DeviceId, RegistryError, TrackedPosition};

/// Store key holding the id of the active tracker.
pub const ACTIVE_TRACKER_KEY: &str = "activeTrackerDeviceId";
/// Store key holding the last published position.
pub const POSITION_KEY: &str = "currentTrainLocationData";

pub const DEFAULT_TRACKER_TOKEN: &str = "TRACKSHUTTLE";
pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::Asia::Dhaka;

/// Stored position record, tagged with the device that wrote it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPosition {
    tracker_id: DeviceId,
    #[serde(flatten)]
    position: TrackedPosition,
}

/// Change observed on the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// The active tracker slot changed; carries the new holder.
    TrackerChanged(Option<DeviceId>),
    /// A position was published or discarded.
    PositionChanged,
}

/// Typed access to the tracker slot and the tracked position.
///
/// Every device holds its own registry over the same shared store.
#[derive(Clone)]
pub struct TrackerRegistry {
    store: Arc<dyn KeyValueStore>,
    token: String,
    time_zone: Tz,
}

impl std::fmt::Debug for TrackerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerRegistry")
            .field("time_zone", &self.time_zone)
            .finish_non_exhaustive()
    }
}

impl TrackerRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, token: impl Into<String>) -> Self {
        TrackerRegistry {
            store,
            token: token.into(),
            time_zone: DEFAULT_TIME_ZONE,
        }
    }

    /// Time zone used to render status messages.
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Claim the tracker slot for `device_id`.
    ///
    /// Succeeds again for the device already holding the slot.
    pub fn register(&self, device_id: &DeviceId, token: &str) -> Result<(), RegistryError> {
        if token != self.token {
            tracing::warn!("Rejected tracker registration for {}: invalid token", device_id);
            return Err(RegistryError::InvalidToken);
        }

        match self.store.compare_and_swap(
            ACTIVE_TRACKER_KEY,
            None,
            Some(device_id.as_str().to_string()),
        ) {
            Ok(()) => {
                tracing::info!("Device {} registered as tracker", device_id);
                Ok(())
            }
            Err(Some(holder)) if holder == device_id.as_str() => Ok(()),
            Err(_) => {
                tracing::info!(
                    "Device {} could not register: slot held by another device",
                    device_id
                );
                Err(RegistryError::SlotConflict)
            }
        }
    }

    /// Release the tracker slot and discard the last position.
    ///
    /// The position is removed while the slot still guards it.
    pub fn unregister(&self, device_id: &DeviceId) -> Result<(), RegistryError> {
        let not_owner = || RegistryError::NotOwner {
            device_id: device_id.clone(),
        };
        self.store
            .set_guarded(ACTIVE_TRACKER_KEY, device_id.as_str(), POSITION_KEY, None)
            .map_err(|_| not_owner())?;
        self.store
            .compare_and_swap(ACTIVE_TRACKER_KEY, Some(device_id.as_str()), None)
            .map_err(|_| not_owner())?;
        tracing::info!("Device {} unregistered, tracking stopped", device_id);
        Ok(())
    }

    /// Store `coordinate` as the tracked position if `device_id` owns the slot.
    pub fn publish(
        &self,
        device_id: &DeviceId,
        coordinate: Coordinate,
    ) -> Result<TrackedPosition, RegistryError> {
        let position = TrackedPosition {
            coordinate,
            status_message: Some(self.status_message(coordinate.timestamp)),
        };
        let record = StoredPosition {
            tracker_id: device_id.clone(),
            position: position.clone(),
        };
        let raw = serde_json::to_string(&record)?;
        self.store
            .set_guarded(ACTIVE_TRACKER_KEY, device_id.as_str(), POSITION_KEY, Some(raw))
            .map_err(|_| {
                tracing::warn!("Position from {} rejected: not the active tracker", device_id);
                RegistryError::NotAuthorized {
                    device_id: device_id.clone(),
                }
            })?;
        tracing::debug!(
            "Position updated by {}: {}, {}",
            device_id,
            coordinate.latitude,
            coordinate.longitude
        );
        Ok(position)
    }

    /// Current tracked position, if a tracker is active and has published.
    ///
    /// Unreadable records are treated as absent.
    pub fn fetch(&self) -> Option<TrackedPosition> {
        let active = self.active_tracker()?;
        let raw = self.store.get(POSITION_KEY)?;
        let record: StoredPosition = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Error parsing stored position: {}", e);
                return None;
            }
        };
        // Written by a device that no longer holds the slot
        if record.tracker_id != active {
            return None;
        }
        Some(record.position)
    }

    pub fn active_tracker(&self) -> Option<DeviceId> {
        self.store.get(ACTIVE_TRACKER_KEY).map(DeviceId::new)
    }

    pub fn is_tracker_active(&self) -> bool {
        self.active_tracker().is_some()
    }

    pub fn subscribe(&self) -> RegistrySubscription {
        RegistrySubscription {
            store: self.store.clone(),
            changes: self.store.subscribe(),
        }
    }

    fn status_message(&self, timestamp: Option<i64>) -> String {
        let at = timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
            .with_timezone(&self.time_zone);
        format!("Location updated by tracker at {}", at.format("%I:%M:%S %p"))
    }
}

/// Stream of [`RegistryEvent`]s.
pub struct RegistrySubscription {
    store: Arc<dyn KeyValueStore>,
    changes: broadcast::Receiver<StoreChange>,
}

impl RegistrySubscription {
    /// Wait for the next registry event. Returns `None` if the change feed closes.
    pub async fn recv(&mut self) -> Option<RegistryEvent> {
        loop {
            match self.changes.recv().await {
                Ok(change) => {
                    if let Some(event) = self.to_event(&change) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Registry subscriber lagged, {} changes skipped", skipped);
                    return Some(self.tracker_changed());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn to_event(&self, change: &StoreChange) -> Option<RegistryEvent> {
        match change.key.as_str() {
            ACTIVE_TRACKER_KEY => Some(self.tracker_changed()),
            POSITION_KEY => Some(RegistryEvent::PositionChanged),
            _ => None,
        }
    }

    fn tracker_changed(&self) -> RegistryEvent {
        RegistryEvent::TrackerChanged(self.store.get(ACTIVE_TRACKER_KEY).map(DeviceId::new))
    }
}
