// src/config.rs

use crate::types::JunctionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound for the emergency TTL and alert window (one day).
pub const MAX_WINDOW_SECS: i64 = 86_400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decoder: DecoderConfig,
    pub density: DensityConfig,
    pub junction: JunctionConfig,
    pub emergency: EmergencyConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Square inference resolution the model was fed
    pub input_size: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Labels that survive decoding
    pub vehicle_labels: Vec<String>,
    /// Candidate count assumed when the output shape is unrecognized
    pub fallback_rows: usize,
    pub fallback_channels: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            vehicle_labels: ["car", "truck", "bus", "motorcycle", "bicycle"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_rows: 8400,
            fallback_channels: 84,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    pub confidence_threshold: f32,
    /// Road capacity in weighted-vehicle units
    pub road_capacity: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            road_capacity: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub confidence_threshold: f32,
    pub vehicle_ttl_secs: i64,
    pub alert_window_secs: i64,
    pub default_distance_m: f32,
    pub default_speed_mps: f32,
    /// Confidence assumed when the raw record carries none
    pub default_confidence: f32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            vehicle_ttl_secs: 120,
            alert_window_secs: 300,
            default_distance_m: 100.0,
            default_speed_mps: 15.0,
            default_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub input_dir: String,
    pub refresh_interval_secs: u64,
    pub event_bus_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            input_dir: "captures".to_string(),
            refresh_interval_secs: 30,
            event_bus_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "traffic_signal_engine=info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        info!("✓ Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let j = &self.junction;
        let durations = [
            ("min_green_time", j.min_green_time),
            ("max_green_time", j.max_green_time),
            ("base_red_time", j.base_red_time),
        ];
        for (name, secs) in durations {
            if secs.fract() != 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "junction '{}': {} must be whole seconds, got {}",
                    j.id, name, secs
                )));
            }
        }
        if j.min_green_time < 0.0 || j.min_green_time > j.max_green_time {
            return Err(ConfigError::Invalid(format!(
                "junction '{}': min_green_time {} must be within [0, max_green_time {}]",
                j.id, j.min_green_time, j.max_green_time
            )));
        }
        if j.base_red_time < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "junction '{}': base_red_time must be non-negative",
                j.id
            )));
        }
        if j.rush_hour_multiplier <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "junction '{}': rush_hour_multiplier must be positive",
                j.id
            )));
        }
        if self.density.road_capacity <= 0.0 {
            return Err(ConfigError::Invalid(
                "density.road_capacity must be positive".to_string(),
            ));
        }
        if self.decoder.input_size == 0 {
            return Err(ConfigError::Invalid(
                "decoder.input_size must be non-zero".to_string(),
            ));
        }

        let thresholds = [
            ("decoder.confidence_threshold", self.decoder.confidence_threshold),
            ("decoder.iou_threshold", self.decoder.iou_threshold),
            ("density.confidence_threshold", self.density.confidence_threshold),
            ("emergency.confidence_threshold", self.emergency.confidence_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        let windows = [
            ("emergency.vehicle_ttl_secs", self.emergency.vehicle_ttl_secs),
            ("emergency.alert_window_secs", self.emergency.alert_window_secs),
        ];
        for (name, secs) in windows {
            if secs <= 0 || secs > MAX_WINDOW_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [1, {}], got {}",
                    name, MAX_WINDOW_SECS, secs
                )));
            }
        }

        if self.emergency.default_speed_mps <= 0.0 {
            return Err(ConfigError::Invalid(
                "emergency.default_speed_mps must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
