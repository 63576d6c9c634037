use std::time::Duration;

use shuttle_core::{RegistryEvent, TrackedPosition, TrackerRegistry};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps an observer's view of the tracked position fresh.
///
/// Fetches on a fixed interval, and right away whenever the registry reports
/// a change.
pub struct PositionPoller {
    registry: TrackerRegistry,
    interval: Duration,
}

impl PositionPoller {
    pub fn new(registry: TrackerRegistry) -> Self {
        PositionPoller {
            registry,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> PollerHandle {
        let (positions_tx, positions_rx) = watch::channel(self.registry.fetch());
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(positions_tx, cancel_rx));
        PollerHandle {
            positions: positions_rx,
            cancel: cancel_tx,
            task,
        }
    }

    async fn run(
        self,
        positions: watch::Sender<Option<TrackedPosition>>,
        mut cancel: oneshot::Receiver<()>,
    ) {
        let mut subscription = self.registry.subscribe();
        let mut subscribed = true;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut cancel => break,
                _ = ticker.tick() => self.refresh(&positions),
                event = subscription.recv(), if subscribed => match event {
                    Some(RegistryEvent::TrackerChanged(None)) => {
                        positions.send_replace(None);
                    }
                    Some(_) => self.refresh(&positions),
                    None => subscribed = false,
                },
            }
        }
        tracing::debug!("Position polling stopped");
    }

    fn refresh(&self, positions: &watch::Sender<Option<TrackedPosition>>) {
        let latest = self.registry.fetch();
        positions.send_if_modified(|current| {
            if *current == latest {
                return false;
            }
            *current = latest;
            true
        });
    }
}

/// Handle of a spawned [`PositionPoller`].
pub struct PollerHandle {
    positions: watch::Receiver<Option<TrackedPosition>>,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Receiver notified whenever the tracked position changes.
    pub fn positions(&self) -> watch::Receiver<Option<TrackedPosition>> {
        self.positions.clone()
    }

    pub fn latest(&self) -> Option<TrackedPosition> {
        self.positions.borrow().clone()
    }

    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.cancel.send(());
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shuttle_core::store::{KeyValueStore, MemoryStore};
    use shuttle_core::{Coordinate, DEFAULT_TRACKER_TOKEN, DeviceId, POSITION_KEY};

    use super::*;

    fn setup() -> (Arc<dyn KeyValueStore>, TrackerRegistry) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let registry = TrackerRegistry::new(store.clone(), DEFAULT_TRACKER_TOKEN);
        (store, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_follows_tracker() {
        let (_store, registry) = setup();
        let tracker = DeviceId::from("tracker");
        let poller = PositionPoller::new(registry.clone()).spawn();
        let mut positions = poller.positions();
        assert_eq!(poller.latest(), None);

        registry.register(&tracker, DEFAULT_TRACKER_TOKEN).unwrap();
        let published = registry
            .publish(&tracker, Coordinate::new(22.41, 91.80))
            .unwrap();

        positions
            .wait_for(|p| p.as_ref() == Some(&published))
            .await
            .unwrap();

        registry.unregister(&tracker).unwrap();
        positions.wait_for(Option::is_none).await.unwrap();

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_recovers_from_corrupt_record() {
        let (store, registry) = setup();
        let tracker = DeviceId::from("tracker");
        registry.register(&tracker, DEFAULT_TRACKER_TOKEN).unwrap();
        store.set(POSITION_KEY, "garbage".into());

        let poller = PositionPoller::new(registry.clone())
            .with_interval(Duration::from_millis(500))
            .spawn();
        assert_eq!(poller.latest(), None);

        let published = registry
            .publish(&tracker, Coordinate::new(22.43, 91.80))
            .unwrap();
        let mut positions = poller.positions();
        positions
            .wait_for(|p| p.as_ref() == Some(&published))
            .await
            .unwrap();

        poller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_sees_writes_made_before_start() {
        let (_store, registry) = setup();
        let tracker = DeviceId::from("tracker");
        let poller = PositionPoller::new(registry.clone()).spawn();

        // Written before the poller task ever ran
        registry.register(&tracker, DEFAULT_TRACKER_TOKEN).unwrap();
        registry
            .publish(&tracker, Coordinate::new(22.44, 91.80))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            poller.latest().map(|p| p.coordinate.latitude),
            Some(22.44)
        );

        poller.stop().await.unwrap();
    }
}
