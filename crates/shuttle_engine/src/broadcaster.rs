use shuttle_core::{
    Coordinate, DeviceId, RegistryError, RegistryEvent, RegistrySubscription, TrackedPosition,
    TrackerRegistry,
};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::sensor::{GeolocationWatcher, LocationSensor, SensorError};

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Cannot become tracker: {0}")]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Why a broadcast ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Stopped on request; the slot was released.
    Cancelled,
    /// Another device holds the slot now.
    OwnershipLost,
    /// The sensor can no longer deliver fixes; the slot was released.
    Sensor(SensorError),
}

/// Latest state of a running broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastStatus {
    /// Registered, waiting for the first fix.
    WaitingForFix,
    Sent(TrackedPosition),
    /// A fix did not arrive in time; still broadcasting.
    SensorProblem(SensorError),
    Stopped(StopReason),
}

/// Publishes every fix of a sensor while the device owns the tracker slot.
pub struct Broadcaster<S> {
    registry: TrackerRegistry,
    device_id: DeviceId,
    watcher: GeolocationWatcher<S>,
    subscription: RegistrySubscription,
    status: watch::Sender<BroadcastStatus>,
}

impl<S: LocationSensor + 'static> Broadcaster<S> {
    /// Register `device_id` as tracker and prepare broadcasting.
    ///
    /// Refuses up front when the sensor has no permission to deliver fixes.
    pub fn register(
        registry: TrackerRegistry,
        device_id: DeviceId,
        token: &str,
        watcher: GeolocationWatcher<S>,
    ) -> Result<Self, BroadcastError> {
        watcher.check_permission()?;
        registry.register(&device_id, token)?;
        // Subscribe right away so a takeover before the first poll is not missed
        let subscription = registry.subscribe();
        let (status, _) = watch::channel(BroadcastStatus::WaitingForFix);
        Ok(Broadcaster {
            registry,
            device_id,
            watcher,
            subscription,
            status,
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn status(&self) -> watch::Receiver<BroadcastStatus> {
        self.status.subscribe()
    }

    /// Run the broadcast on its own task.
    pub fn spawn(self) -> BroadcastHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let status = self.status();
        let device_id = self.device_id.clone();
        let task = tokio::spawn(self.run(cancel_rx));
        BroadcastHandle {
            device_id,
            status,
            cancel: cancel_tx,
            task,
        }
    }

    /// Publish fixes until cancelled, until ownership is lost or until the
    /// sensor fails for good.
    pub async fn run(mut self, mut cancel: oneshot::Receiver<()>) -> StopReason {
        let mut subscribed = true;

        let reason = loop {
            tokio::select! {
                // A dropped handle counts as a stop request too
                _ = &mut cancel => {
                    self.release();
                    break StopReason::Cancelled;
                }
                event = self.subscription.recv(), if subscribed => match event {
                    Some(RegistryEvent::TrackerChanged(holder))
                        if holder.as_ref() != Some(&self.device_id) =>
                    {
                        tracing::info!(
                            "Device {} is no longer the active tracker, broadcasting stopped",
                            self.device_id
                        );
                        break StopReason::OwnershipLost;
                    }
                    Some(_) => {}
                    None => subscribed = false,
                },
                fix = self.watcher.next_fix() => match fix {
                    Ok(coordinate) => {
                        if let Some(reason) = self.send(coordinate) {
                            break reason;
                        }
                    }
                    Err(error) if error.is_fatal() => {
                        tracing::warn!("Geolocation error: {}, broadcasting stopped", error);
                        self.release();
                        break StopReason::Sensor(error);
                    }
                    Err(error) => {
                        tracing::warn!("Geolocation error: {}", error);
                        self.status.send_replace(BroadcastStatus::SensorProblem(error));
                    }
                },
            }
        };

        self.status.send_replace(BroadcastStatus::Stopped(reason.clone()));
        reason
    }

    /// Publish one fix. Returns the stop reason if broadcasting has to end.
    fn send(&mut self, coordinate: Coordinate) -> Option<StopReason> {
        match self.registry.publish(&self.device_id, coordinate) {
            Ok(position) => {
                self.status.send_replace(BroadcastStatus::Sent(position));
                None
            }
            Err(RegistryError::NotAuthorized { .. }) => {
                tracing::info!(
                    "Device {} lost the tracker slot, broadcasting stopped",
                    self.device_id
                );
                Some(StopReason::OwnershipLost)
            }
            Err(error) => {
                tracing::error!("Failed to send location: {}", error);
                None
            }
        }
    }

    fn release(&self) {
        if let Err(error) = self.registry.unregister(&self.device_id) {
            tracing::warn!("Could not unregister {}: {}", self.device_id, error);
        }
    }
}

/// Control handle of a spawned [`Broadcaster`].
pub struct BroadcastHandle {
    device_id: DeviceId,
    status: watch::Receiver<BroadcastStatus>,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<StopReason>,
}

impl BroadcastHandle {
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn status(&self) -> watch::Receiver<BroadcastStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop broadcasting and release the slot if still held.
    pub async fn stop(self) -> Result<StopReason, JoinError> {
        // The task may already have ended on its own.
        let _ = self.cancel.send(());
        self.task.await
    }

    /// Wait for the broadcast to end on its own.
    pub async fn finished(self) -> Result<StopReason, JoinError> {
        let BroadcastHandle { cancel, task, .. } = self;
        let result = task.await;
        drop(cancel);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shuttle_core::store::{KeyValueStore, MemoryStore};
    use shuttle_core::{ACTIVE_TRACKER_KEY, DEFAULT_TRACKER_TOKEN};

    use super::*;
    use crate::sensor::{ChannelSensor, PermissionState, ScriptedSensor, SensorFeed};

    fn setup() -> (Arc<dyn KeyValueStore>, TrackerRegistry) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let registry = TrackerRegistry::new(store.clone(), DEFAULT_TRACKER_TOKEN);
        (store, registry)
    }

    fn channel_watcher(
        permission: PermissionState,
    ) -> (GeolocationWatcher<ChannelSensor>, SensorFeed) {
        let (sensor, feed) = ChannelSensor::new(8, permission);
        (GeolocationWatcher::new(sensor), feed)
    }

    #[tokio::test]
    async fn test_broadcast_publishes_and_stops() {
        let (_store, registry) = setup();
        let (watcher, feed) = channel_watcher(PermissionState::Granted);
        let device = DeviceId::from("tracker");

        let handle =
            Broadcaster::register(registry.clone(), device, DEFAULT_TRACKER_TOKEN, watcher)
                .expect("Registration should succeed")
                .spawn();
        let mut status = handle.status();

        feed.push(Coordinate::new(22.40, 91.81)).await;
        status
            .wait_for(|s| matches!(s, BroadcastStatus::Sent(_)))
            .await
            .unwrap();
        assert_eq!(registry.fetch().unwrap().coordinate, Coordinate::new(22.40, 91.81));

        assert_eq!(handle.stop().await.unwrap(), StopReason::Cancelled);
        assert_eq!(registry.active_tracker(), None);
        assert_eq!(registry.fetch(), None);
    }

    #[tokio::test]
    async fn test_register_refused_without_permission() {
        let (_store, registry) = setup();
        let (watcher, _feed) = channel_watcher(PermissionState::Denied);

        let result = Broadcaster::register(
            registry.clone(),
            DeviceId::from("tracker"),
            DEFAULT_TRACKER_TOKEN,
            watcher,
        );
        assert!(matches!(
            result,
            Err(BroadcastError::Sensor(SensorError::PermissionDenied))
        ));
        assert_eq!(registry.active_tracker(), None);
    }

    #[tokio::test]
    async fn test_register_slot_conflict() {
        let (_store, registry) = setup();
        registry
            .register(&DeviceId::from("other"), DEFAULT_TRACKER_TOKEN)
            .unwrap();
        let (watcher, _feed) = channel_watcher(PermissionState::Granted);

        let result = Broadcaster::register(
            registry,
            DeviceId::from("tracker"),
            DEFAULT_TRACKER_TOKEN,
            watcher,
        );
        assert!(matches!(
            result,
            Err(BroadcastError::Registry(RegistryError::SlotConflict))
        ));
    }

    #[tokio::test]
    async fn test_ownership_lost_stops_without_unregistering() {
        let (store, registry) = setup();
        let (watcher, _feed) = channel_watcher(PermissionState::Granted);
        let device = DeviceId::from("tracker");

        let handle =
            Broadcaster::register(registry.clone(), device, DEFAULT_TRACKER_TOKEN, watcher)
                .unwrap()
                .spawn();

        // A client bypassing the registry overwrites the slot
        store.set(ACTIVE_TRACKER_KEY, "intruder".into());

        assert_eq!(handle.finished().await.unwrap(), StopReason::OwnershipLost);
        assert_eq!(registry.active_tracker(), Some(DeviceId::from("intruder")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_broadcasting() {
        let (_store, registry) = setup();
        let (sensor, feed) = ChannelSensor::new(8, PermissionState::Granted);
        let watcher = GeolocationWatcher::new(sensor).with_timeout(Duration::from_secs(10));

        let handle = Broadcaster::register(
            registry.clone(),
            DeviceId::from("tracker"),
            DEFAULT_TRACKER_TOKEN,
            watcher,
        )
        .unwrap()
        .spawn();
        let mut status = handle.status();

        status
            .wait_for(|s| *s == BroadcastStatus::SensorProblem(SensorError::Timeout))
            .await
            .unwrap();
        assert!(!handle.is_finished());

        feed.push(Coordinate::new(22.41, 91.80)).await;
        status
            .wait_for(|s| matches!(s, BroadcastStatus::Sent(_)))
            .await
            .unwrap();
        assert!(registry.fetch().is_some());

        assert_eq!(handle.stop().await.unwrap(), StopReason::Cancelled);
    }

    #[tokio::test]
    async fn test_fatal_sensor_error_releases_slot() {
        let (_store, registry) = setup();
        let (watcher, feed) = channel_watcher(PermissionState::Granted);

        let handle = Broadcaster::register(
            registry.clone(),
            DeviceId::from("tracker"),
            DEFAULT_TRACKER_TOKEN,
            watcher,
        )
        .unwrap()
        .spawn();

        feed.fail(SensorError::Unavailable).await;

        assert_eq!(
            handle.finished().await.unwrap(),
            StopReason::Sensor(SensorError::Unavailable)
        );
        assert_eq!(registry.active_tracker(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_route_ends_at_last_fix() {
        let (_store, registry) = setup();
        let sensor = ScriptedSensor::from_fixes([
            Coordinate::new(22.35, 91.82),
            Coordinate::new(22.39, 91.81),
            Coordinate::new(22.47, 91.795),
        ]);
        let watcher = GeolocationWatcher::new(sensor);

        let handle = Broadcaster::register(
            registry.clone(),
            DeviceId::from("tracker"),
            DEFAULT_TRACKER_TOKEN,
            watcher,
        )
        .unwrap()
        .spawn();
        let mut status = handle.status();

        status
            .wait_for(|s| match s {
                BroadcastStatus::Sent(position) => position.coordinate.latitude == 22.47,
                _ => false,
            })
            .await
            .unwrap();
        assert_eq!(registry.fetch().unwrap().coordinate.latitude, 22.47);

        assert_eq!(handle.stop().await.unwrap(), StopReason::Cancelled);
    }
}
