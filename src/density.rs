// src/density.rs
//
// Traffic density estimation from a batch of raw detections.
//
// Signal flow:
//   RawDetection[] → confidence filter (≥ 0.5) → geometry classifier
//                  → weighted occupancy / capacity → TrafficDensity

use crate::config::DensityConfig;
use crate::types::{CongestionLevel, RawDetection, TrafficDensity, VehicleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Free-flow speed used by the density → speed proxy (km/h).
const FREE_FLOW_SPEED_KMH: f64 = 50.0;

// ============================================================================
// CLASSIFICATION POLICY
// ============================================================================

/// Assigns a vehicle type to untrusted geometry.
pub trait VehicleClassifier {
    fn classify(&self, detection: &RawDetection) -> VehicleType;
}

/// Box area / aspect-ratio thresholds. Ignores any upstream label.
#[derive(Debug, Clone, Copy)]
pub struct SizeHeuristicClassifier {
    pub bus_min_area: f32,
    pub truck_min_area: f32,
    pub motorcycle_max_aspect: f32,
    pub bicycle_max_area: f32,
}

impl Default for SizeHeuristicClassifier {
    fn default() -> Self {
        Self {
            bus_min_area: 15_000.0,
            truck_min_area: 10_000.0,
            motorcycle_max_aspect: 0.8,
            bicycle_max_area: 3_000.0,
        }
    }
}

impl VehicleClassifier for SizeHeuristicClassifier {
    fn classify(&self, detection: &RawDetection) -> VehicleType {
        let area = detection.width * detection.height;
        // Zero height gives inf/NaN, neither of which reads as a motorcycle.
        let aspect_ratio = detection.width / detection.height;

        if area > self.bus_min_area {
            VehicleType::Bus
        } else if area > self.truck_min_area {
            VehicleType::Truck
        } else if aspect_ratio < self.motorcycle_max_aspect {
            VehicleType::Motorcycle
        } else if area < self.bicycle_max_area {
            VehicleType::Bicycle
        } else {
            VehicleType::Car
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// A confidence-filtered detection with its geometry-derived type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedDetection {
    pub id: String,
    pub vehicle_type: VehicleType,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// ESTIMATOR
// ============================================================================

pub struct DensityEstimator<C: VehicleClassifier = SizeHeuristicClassifier> {
    config: DensityConfig,
    classifier: C,
}

impl DensityEstimator<SizeHeuristicClassifier> {
    pub fn new(config: DensityConfig) -> Self {
        Self::with_classifier(config, SizeHeuristicClassifier::default())
    }
}

impl<C: VehicleClassifier> DensityEstimator<C> {
    pub fn with_classifier(config: DensityConfig, classifier: C) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &DensityConfig {
        &self.config
    }

    /// Drop detections below the confidence threshold. Order-preserving and
    /// idempotent; a missing confidence never passes.
    pub fn retain_confident(&self, detections: &[RawDetection]) -> Vec<RawDetection> {
        detections
            .iter()
            .filter(|d| {
                d.confidence
                    .map_or(false, |c| c >= self.config.confidence_threshold)
            })
            .cloned()
            .collect()
    }

    /// Confidence filter followed by geometry classification.
    pub fn filter_by_confidence(&self, detections: &[RawDetection]) -> Vec<ClassifiedDetection> {
        self.filter_by_confidence_at(detections, Utc::now())
    }

    pub fn filter_by_confidence_at(
        &self,
        detections: &[RawDetection],
        now: DateTime<Utc>,
    ) -> Vec<ClassifiedDetection> {
        let kept: Vec<ClassifiedDetection> = self
            .retain_confident(detections)
            .into_iter()
            .map(|d| ClassifiedDetection {
                id: d
                    .track_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                vehicle_type: self.classifier.classify(&d),
                confidence: d.confidence.unwrap_or_default(),
                x: d.x,
                y: d.y,
                width: d.width,
                height: d.height,
                timestamp: now,
            })
            .collect();

        debug!(
            "Confidence filter kept {}/{} detections",
            kept.len(),
            detections.len()
        );
        kept
    }

    /// Aggregate a filtered batch into one density snapshot.
    pub fn calculate_traffic_density(&self, detections: &[ClassifiedDetection]) -> TrafficDensity {
        let vehicle_count = detections.len();
        let weighted_count: f64 = detections.iter().map(|d| d.vehicle_type.weight()).sum();

        let capacity = self.config.road_capacity;
        let density = if capacity > 0.0 {
            (weighted_count / capacity).min(1.0)
        } else if weighted_count > 0.0 {
            1.0
        } else {
            0.0
        };

        TrafficDensity {
            vehicle_count,
            density,
            congestion_level: CongestionLevel::from_density(density),
            average_speed: estimate_average_speed(density),
            queue_length: (weighted_count * 0.8).round(),
        }
    }
}

/// Linear speed proxy, strictly decreasing in density (km/h).
pub fn estimate_average_speed(density: f64) -> f64 {
    (FREE_FLOW_SPEED_KMH * (1.0 - density * 0.8)).round()
}
