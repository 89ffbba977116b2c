//! Configuration for the matching engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Matching engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Registry data directory
    pub registry_data_dir: PathBuf,

    /// Matching configuration
    pub matching: MatchingConfig,

    /// Re-activation scheduler configuration
    pub scheduler: SchedulerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "matching".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            registry_data_dir: PathBuf::from("./data/registry"),
            matching: MatchingConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Radius applied when a search supplies coordinates but no radius (km)
    pub default_radius_km: f64,

    /// Auto-match requests created with emergency urgency
    pub auto_match_emergency: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_radius_km: 10.0,
            auto_match_emergency: true,
        }
    }
}

/// Re-activation scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often to poll for due jobs (seconds)
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            // Due times are days out; minute-level polling is plenty
            poll_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("MATCHING_REGISTRY_DATA_DIR") {
            config.registry_data_dir = PathBuf::from(data_dir);
        }

        if let Ok(secs) = std::env::var("MATCHING_POLL_INTERVAL_SECS") {
            config.scheduler.poll_interval_secs = secs
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid poll interval: {}", e)))?;
        }

        Ok(config)
    }
}
