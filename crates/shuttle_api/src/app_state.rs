use std::sync::Arc;
use std::time::Duration;

use shuttle_core::store::{KeyValueStore, MemoryStore};
use shuttle_core::{Route, TrackerRegistry};
use shuttle_engine::Engine;

use crate::config::ServiceConfig;

/// State shared by every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// The service configuration loaded at startup (immutable)
    pub config: Arc<ServiceConfig>,
    pub engine: Engine,
}

impl AppState {
    /// Creates the state over a fresh in-memory store
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Creates the state over the given shared store
    pub fn with_store(config: ServiceConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let registry = TrackerRegistry::new(store, config.tracker_token.clone())
            .with_time_zone(config.time_zone);
        let engine = Engine::new(registry, Route::new(config.stations.clone()))
            .with_average_speed(config.average_speed_kmh)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        Self {
            config: Arc::new(config),
            engine,
        }
    }

    pub fn registry(&self) -> &TrackerRegistry {
        self.engine.registry()
    }
}
