//! Configuration for the pinwatch agent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/gpio_config.json";

/// Main configuration for the monitoring agent.
///
/// Every field has a default, so a partial (or absent) config file is fine.
/// Only `pin_labels` can change at runtime; the rest is read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// BCM pin numbers to monitor
    pub monitored_lines: Vec<u8>,

    /// Sampling tick interval
    #[serde(rename = "update_interval_seconds", with = "duration_secs")]
    pub update_interval: Duration,

    /// Default window for history queries, in minutes
    pub history_window_minutes: u64,

    /// Human-readable labels per pin
    pub pin_labels: HashMap<u8, String>,

    /// Per-tick flip probability of the simulated source
    pub simulation_flip_probability: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitored_lines: (2..=27).collect(),
            update_interval: Duration::from_millis(100),
            history_window_minutes: 60,
            pin_labels: HashMap::new(),
            simulation_flip_probability: 0.01,
        }
    }
}

impl Config {
    /// Load configuration from the given path.
    ///
    /// A missing file is not an error; it yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any error.
    ///
    /// A malformed file is logged as a warning and never aborts startup.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Invalid config at {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Label for a pin, falling back to a generated name.
    pub fn label_for(&self, pin: u8) -> String {
        self.pin_labels
            .get(&pin)
            .cloned()
            .unwrap_or_else(|| format!("GPIO {pin}"))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(serde::de::Error::custom(
                "update_interval_seconds must be a positive number",
            ));
        }
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("update_interval_seconds is out of range")
        })
    }
}
