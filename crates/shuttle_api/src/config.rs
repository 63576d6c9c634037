use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use shuttle_core::{DEFAULT_AVERAGE_SPEED_KMH, DEFAULT_TIME_ZONE, DEFAULT_TRACKER_TOKEN, Station};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Average speed must be positive, got {0} km/h")]
    InvalidSpeed(f64),
    #[error("Poll interval must be positive")]
    InvalidPollInterval,
}

/// Service configuration, loaded at startup (immutable)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    pub route_name: String,
    /// Route stations, in any order
    pub stations: Vec<Station>,
    /// Shared secret a device must present to become the tracker
    pub tracker_token: String,
    /// Assumed average shuttle speed in km/h
    pub average_speed_kmh: f64,
    /// IANA time zone used for clock times
    pub time_zone: Tz,
    /// How often observers should poll the position, in milliseconds
    pub poll_interval_ms: u64,
    pub map: MapConfig,
}

/// Defaults for clients rendering a map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapConfig {
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub default_zoom: u8,
    /// Zoom level used while following the tracker
    pub tracker_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            default_latitude: 22.4637,
            default_longitude: 91.8035,
            default_zoom: 13,
            tracker_zoom: 16,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            route_name: "CU Shuttle".into(),
            stations: campus_stations(),
            tracker_token: DEFAULT_TRACKER_TOKEN.into(),
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            time_zone: DEFAULT_TIME_ZONE,
            poll_interval_ms: 1000,
            map: MapConfig::default(),
        }
    }
}

/// City to campus, south to north.
fn campus_stations() -> Vec<Station> {
    vec![
        Station::new("Bottoli Station", 22.3500, 91.8200),
        Station::new("Dewanhat", 22.3530, 91.8180),
        Station::new("Jhawtola", 22.3560, 91.8170),
        Station::new("Sholoshohor Station", 22.3600, 91.8300),
        Station::new("Muradpur", 22.3650, 91.8350),
        Station::new("Technical Jn.", 22.3700, 91.8380),
        Station::new("Cantonment Station", 22.3900, 91.8100),
        Station::new("Chowdhury Hat", 22.4200, 91.8050),
        Station::new("Fateyabad Station", 22.4400, 91.8000),
        Station::new("CU Campus Station", 22.4700, 91.7950),
    ]
}

impl ServiceConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.average_speed_kmh.is_nan() || self.average_speed_kmh <= 0.0 {
            return Err(ConfigError::InvalidSpeed(self.average_speed_kmh));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }
}
