// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// DETECTIONS
// ============================================================================

/// Axis-aligned rectangle in source-image pixel coordinates.
///
/// Always normalized so that `xmin <= xmax` and `ymin <= ymax`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            xmin: x1.min(x2),
            ymin: y1.min(y2),
            xmax: x1.max(x2),
            ymax: y1.max(y2),
        }
    }

    /// Build from YOLO center/size format.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Scale both axes independently.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(
            self.xmin * sx,
            self.ymin * sy,
            self.xmax * sx,
            self.ymax * sy,
        )
    }
}

/// A single recognized object in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub score: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Raw detection row as stored by the external persistence layer.
///
/// Every field except geometry is optional; missing values fall back to
/// fixed defaults in the stage that reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDetection {
    pub track_id: Option<String>,
    /// Top-left corner, pixels
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: Option<f32>,
    pub class_name: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    /// Reported speed (m/s)
    pub speed: Option<f32>,
    pub has_flashing_lights: bool,
    pub has_emergency_marking: bool,
    pub has_ambulance_marking: bool,
    pub previous_x: Option<f32>,
    pub previous_y: Option<f32>,
    /// Meters to the stop line
    pub distance_to_intersection: Option<f32>,
}

impl From<&Detection> for RawDetection {
    fn from(det: &Detection) -> Self {
        Self {
            x: det.bbox.xmin,
            y: det.bbox.ymin,
            width: det.bbox.width(),
            height: det.bbox.height(),
            confidence: Some(det.score),
            class_name: Some(det.label.clone()),
            ..Self::default()
        }
    }
}

// ============================================================================
// TRAFFIC DENSITY
// ============================================================================

/// Vehicle category assigned by geometry, independent of any upstream label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Truck,
    Bus,
    Motorcycle,
    Bicycle,
}

impl VehicleType {
    /// Occupancy weight in car-equivalent units.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Car => 1.0,
            Self::Motorcycle => 0.5,
            Self::Bicycle => 0.3,
            Self::Truck => 2.0,
            Self::Bus => 2.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Truck => "truck",
            Self::Bus => "bus",
            Self::Motorcycle => "motorcycle",
            Self::Bicycle => "bicycle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    /// Step function with cut points 0.3 and 0.7 (lower bound inclusive).
    pub fn from_density(density: f64) -> Self {
        if density < 0.3 {
            Self::Low
        } else if density < 0.7 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Green-time multiplier applied by the signal controller.
    pub fn green_multiplier(&self) -> f64 {
        match self {
            Self::Low => 0.8,
            Self::Medium => 1.0,
            Self::High => 1.4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Per-evaluation occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficDensity {
    pub vehicle_count: usize,
    /// Capacity-normalized weighted occupancy in [0, 1]
    pub density: f64,
    pub congestion_level: CongestionLevel,
    /// km/h
    pub average_speed: f64,
    pub queue_length: f64,
}

impl Default for TrafficDensity {
    fn default() -> Self {
        Self {
            vehicle_count: 0,
            density: 0.0,
            congestion_level: CongestionLevel::Low,
            average_speed: 50.0,
            queue_length: 0.0,
        }
    }
}

// ============================================================================
// SIGNAL TIMING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalTimingResult {
    /// Seconds
    pub green_time: u32,
    pub red_time: u32,
    /// Always `green_time + red_time`
    pub cycle_time: u32,
    /// Percentage in [0, 100]
    pub efficiency: f64,
    /// Seconds, never negative
    pub wait_time_reduction: f64,
}

/// Static tunables for one intersection. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JunctionConfig {
    pub id: String,
    pub max_green_time: f64,
    pub min_green_time: f64,
    pub base_red_time: f64,
    pub rush_hour_multiplier: f64,
}

impl Default for JunctionConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            max_green_time: 90.0,
            min_green_time: 15.0,
            base_red_time: 30.0,
            rush_hour_multiplier: 1.3,
        }
    }
}
