// src/lib.rs
//
// Traffic perception and signal decision engine.
//
// Signal flow:
//   model output → decoder → suppression → Detection[]
//   RawDetection[] → density ─┬→ signal_timing → SignalTimingResult
//                  emergency ─┘   (preempted while an emergency vehicle is active)
//
// Orchestrated per junction by junction::JunctionEvaluator.

pub mod capture;
pub mod config;
pub mod decoder;
pub mod density;
pub mod emergency;
pub mod junction;
pub mod pipeline;
pub mod preprocessing;
pub mod signal_timing;
pub mod suppression;
pub mod types;

pub use config::{Config, ConfigError};
pub use decoder::{DetectionDecoder, ModelOutput};
pub use density::DensityEstimator;
pub use emergency::{EmergencyAlert, EmergencyMonitor, EmergencyVehicle};
pub use junction::{JunctionEvaluator, JunctionSnapshot, JunctionStats};
pub use signal_timing::SignalController;
pub use types::{
    BoundingBox, CongestionLevel, Detection, JunctionConfig, RawDetection, SignalTimingResult,
    TrafficDensity,
};
