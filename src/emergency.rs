// src/emergency.rs
//
// Emergency vehicle monitor.
//
// Lifecycle per tracked vehicle:
//   DETECTED (heuristic + confidence ≥ 0.7) → ACTIVE (in registry, refreshed
//   on re-detection) → EXPIRED (swept after 120s without re-detection)
//
// The registry is a small insertion-ordered arena keyed by a derived id and
// swept on access. Alerts go to an append-only log; the 5-minute window is a
// read filter, the log itself is never pruned.

use crate::config::EmergencyConfig;
use crate::types::RawDetection;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    Ambulance,
    FireTruck,
    Police,
}

impl EmergencyType {
    /// 1 = highest
    pub fn priority(&self) -> u8 {
        match self {
            Self::FireTruck => 1,
            Self::Ambulance => 2,
            Self::Police => 3,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ambulance => "Ambulance",
            Self::FireTruck => "Fire Truck",
            Self::Police => "Police Vehicle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heading {
    North,
    South,
    East,
    West,
}

impl Heading {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Preempt,
    ClearPath,
    ExtendGreen,
}

impl AlertAction {
    pub fn for_arrival(estimated_arrival: u32) -> Self {
        if estimated_arrival <= 10 {
            Self::Preempt
        } else if estimated_arrival <= 30 {
            Self::ClearPath
        } else {
            Self::ExtendGreen
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyVehicle {
    pub id: String,
    #[serde(rename = "type")]
    pub vehicle_type: EmergencyType,
    pub confidence: f32,
    pub direction: Heading,
    /// Seconds
    pub estimated_arrival: u32,
    pub priority: u8,
    /// Creation or last re-detection time
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    pub vehicle_id: String,
    pub junction_id: String,
    pub message: String,
    pub action: AlertAction,
    /// Seconds
    pub duration: u32,
    pub timestamp: DateTime<Utc>,
}

/// Result of one registry update.
#[derive(Debug, Clone, Default)]
pub struct EmergencyObservation {
    /// Vehicles created or refreshed by this batch
    pub fresh: Vec<EmergencyVehicle>,
    /// Registry contents after the sweep
    pub active: Vec<EmergencyVehicle>,
}

// ============================================================================
// CLASSIFICATION POLICY
// ============================================================================

/// Decides whether a raw detection is an emergency vehicle and which kind.
pub trait EmergencyClassifier {
    fn is_emergency(&self, detection: &RawDetection) -> bool;
    fn classify(&self, detection: &RawDetection) -> EmergencyType;
}

/// Flag, size/speed and color heuristics over the raw record.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicEmergencyClassifier {
    pub min_width: f32,
    pub min_height: f32,
    /// Reported speed above which a large vehicle counts as responding
    pub min_speed: f32,
}

impl Default for HeuristicEmergencyClassifier {
    fn default() -> Self {
        Self {
            min_width: 200.0,
            min_height: 100.0,
            min_speed: 30.0,
        }
    }
}

impl EmergencyClassifier for HeuristicEmergencyClassifier {
    fn is_emergency(&self, d: &RawDetection) -> bool {
        let large = d.width > self.min_width && d.height > self.min_height;
        let fast = d.speed.map_or(false, |s| s > self.min_speed);
        d.has_flashing_lights || d.has_emergency_marking || (large && fast)
    }

    fn classify(&self, d: &RawDetection) -> EmergencyType {
        let color_is = |c: &str| d.color.as_deref().map_or(false, |v| v.eq_ignore_ascii_case(c));
        let large = d.size.as_deref().map_or(false, |v| v.eq_ignore_ascii_case("large"));

        if color_is("red") && large {
            EmergencyType::FireTruck
        } else if d.has_ambulance_marking || color_is("white") {
            EmergencyType::Ambulance
        } else {
            EmergencyType::Police
        }
    }
}

/// Heading from displacement since the previous position.
///
/// A missing previous position reads as (0, 0), which biases the result
/// toward east/south for anything in the positive quadrant. Equal
/// magnitudes resolve on the horizontal axis.
pub fn infer_heading(d: &RawDetection) -> Heading {
    let dx = d.x - d.previous_x.unwrap_or(0.0);
    let dy = d.y - d.previous_y.unwrap_or(0.0);

    if dx.abs() >= dy.abs() {
        if dx > 0.0 {
            Heading::East
        } else {
            Heading::West
        }
    } else if dy > 0.0 {
        Heading::South
    } else {
        Heading::North
    }
}

// ============================================================================
// MONITOR
// ============================================================================

pub struct EmergencyMonitor<C: EmergencyClassifier = HeuristicEmergencyClassifier> {
    config: EmergencyConfig,
    classifier: C,
    registry: Vec<EmergencyVehicle>,
    alerts: Vec<EmergencyAlert>,
}

impl EmergencyMonitor<HeuristicEmergencyClassifier> {
    pub fn new(config: EmergencyConfig) -> Self {
        Self::with_classifier(config, HeuristicEmergencyClassifier::default())
    }
}

impl<C: EmergencyClassifier> EmergencyMonitor<C> {
    pub fn with_classifier(config: EmergencyConfig, classifier: C) -> Self {
        Self {
            config,
            classifier,
            registry: Vec::new(),
            alerts: Vec::new(),
        }
    }

    /// Upsert qualifying detections and return the live registry.
    pub fn detect_emergency_vehicles(&mut self, detections: &[RawDetection]) -> Vec<EmergencyVehicle> {
        self.detect_emergency_vehicles_at(detections, Utc::now())
    }

    pub fn detect_emergency_vehicles_at(
        &mut self,
        detections: &[RawDetection],
        now: DateTime<Utc>,
    ) -> Vec<EmergencyVehicle> {
        self.observe_at(detections, now).active
    }

    /// Like `detect_emergency_vehicles_at`, but also reports which vehicles
    /// this batch created or refreshed.
    pub fn observe_at(&mut self, detections: &[RawDetection], now: DateTime<Utc>) -> EmergencyObservation {
        let fresh: Vec<EmergencyVehicle> = detections
            .iter()
            .filter(|d| self.classifier.is_emergency(d))
            .map(|d| self.create_vehicle(d, now))
            .filter(|v| v.confidence >= self.config.confidence_threshold)
            .collect();

        for vehicle in &fresh {
            self.upsert(vehicle.clone());
        }
        self.sweep(now);

        if !fresh.is_empty() {
            info!(
                "🚑 {} emergency vehicle(s) detected, {} active",
                fresh.len(),
                self.registry.len()
            );
        }

        EmergencyObservation {
            fresh,
            active: self.registry.clone(),
        }
    }

    fn create_vehicle(&self, d: &RawDetection, now: DateTime<Utc>) -> EmergencyVehicle {
        let vehicle_type = self.classifier.classify(d);
        let id = match &d.track_id {
            Some(track) => format!("emergency-{}", track),
            None => format!("emergency-{}", Uuid::new_v4()),
        };

        EmergencyVehicle {
            id,
            vehicle_type,
            confidence: d
                .confidence
                .filter(|c| *c > 0.0)
                .unwrap_or(self.config.default_confidence),
            direction: infer_heading(d),
            estimated_arrival: self.estimate_arrival(d),
            priority: vehicle_type.priority(),
            timestamp: now,
        }
    }

    /// Seconds to the stop line, with fixed defaults for missing distance/speed.
    pub fn estimate_arrival(&self, d: &RawDetection) -> u32 {
        let distance = d
            .distance_to_intersection
            .filter(|v| *v > 0.0)
            .unwrap_or(self.config.default_distance_m);
        let speed = d
            .speed
            .filter(|v| *v > 0.0)
            .unwrap_or(self.config.default_speed_mps);
        (distance / speed).round() as u32
    }

    fn upsert(&mut self, vehicle: EmergencyVehicle) {
        match self.registry.iter_mut().find(|v| v.id == vehicle.id) {
            Some(existing) => *existing = vehicle,
            None => self.registry.push(vehicle),
        }
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        // A TTL too large for chrono never expires anything.
        let Some(ttl) = Duration::try_seconds(self.config.vehicle_ttl_secs.max(0)) else {
            return;
        };
        let before = self.registry.len();
        self.registry.retain(|v| now - v.timestamp <= ttl);
        let expired = before - self.registry.len();
        if expired > 0 {
            debug!("Expired {} emergency vehicle(s)", expired);
        }
    }

    /// Derive an alert for `vehicle` and append it to the log.
    pub fn create_emergency_alert(&mut self, vehicle: &EmergencyVehicle, junction_id: &str) -> EmergencyAlert {
        self.create_emergency_alert_at(vehicle, junction_id, Utc::now())
    }

    pub fn create_emergency_alert_at(
        &mut self,
        vehicle: &EmergencyVehicle,
        junction_id: &str,
        now: DateTime<Utc>,
    ) -> EmergencyAlert {
        let alert = EmergencyAlert {
            vehicle_id: vehicle.id.clone(),
            junction_id: junction_id.to_string(),
            message: alert_message(vehicle),
            action: AlertAction::for_arrival(vehicle.estimated_arrival),
            duration: preemption_duration(vehicle),
            timestamp: now,
        };

        info!(
            "📢 Alert [{}]: {} ({:?}, {}s)",
            junction_id, alert.message, alert.action, alert.duration
        );
        self.alerts.push(alert.clone());
        alert
    }

    /// Alerts raised within the configured window. Does not touch the log.
    pub fn get_active_alerts(&self) -> Vec<EmergencyAlert> {
        self.get_active_alerts_at(Utc::now())
    }

    pub fn get_active_alerts_at(&self, now: DateTime<Utc>) -> Vec<EmergencyAlert> {
        let cutoff = Duration::try_seconds(self.config.alert_window_secs.max(0))
            .and_then(|window| now.checked_sub_signed(window));
        self.alerts
            .iter()
            .filter(|a| cutoff.map_or(true, |c| a.timestamp > c))
            .cloned()
            .collect()
    }

    /// Full alert history, oldest first.
    pub fn alert_log(&self) -> &[EmergencyAlert] {
        &self.alerts
    }

    pub fn has_active_emergency_vehicles(&mut self) -> bool {
        self.has_active_emergency_vehicles_at(Utc::now())
    }

    pub fn has_active_emergency_vehicles_at(&mut self, now: DateTime<Utc>) -> bool {
        self.sweep(now);
        !self.registry.is_empty()
    }

    /// Lowest `priority` value wins; ties go to the earliest registry entry.
    pub fn get_highest_priority_vehicle(&mut self) -> Option<EmergencyVehicle> {
        self.get_highest_priority_vehicle_at(Utc::now())
    }

    pub fn get_highest_priority_vehicle_at(&mut self, now: DateTime<Utc>) -> Option<EmergencyVehicle> {
        self.sweep(now);
        self.registry
            .iter()
            .reduce(|best, v| if v.priority < best.priority { v } else { best })
            .cloned()
    }

    /// Registry contents as of the last sweep.
    pub fn active_vehicles(&self) -> &[EmergencyVehicle] {
        &self.registry
    }
}

fn alert_message(vehicle: &EmergencyVehicle) -> String {
    format!(
        "{} approaching from {}. ETA: {}s",
        vehicle.vehicle_type.display_name(),
        vehicle.direction.as_str(),
        vehicle.estimated_arrival
    )
}

/// 60s base, scaled by 1/priority and by urgency for arrivals under 30s.
fn preemption_duration(vehicle: &EmergencyVehicle) -> u32 {
    let priority_multiplier = 1.0 / f64::from(vehicle.priority.max(1));
    // ETA rounds to 0 for vehicles already at the line; treat as 1s
    let urgency_multiplier = (30.0 / f64::from(vehicle.estimated_arrival.max(1))).max(1.0);
    (60.0 * priority_multiplier * urgency_multiplier).round() as u32
}
