// src/signal_timing.rs
//
// Adaptive green/red split for one junction.
//
// Step order matters: base blend → rush-hour scale → congestion scale →
// clamp → red/cycle → metrics. Intermediate values stay unrounded; only the
// published durations are rounded to whole seconds.

use crate::types::{JunctionConfig, SignalTimingResult, TrafficDensity};
use chrono::{Local, Timelike};
use tracing::{debug, info};

/// Vehicle count at which the count term of the base blend saturates.
const VEHICLE_SATURATION: f64 = 20.0;
/// Seconds needed to discharge one queued vehicle.
const QUEUE_CLEARANCE_SECS: f64 = 2.0;
/// Unmanaged wait per queued vehicle (seconds).
const STANDARD_WAIT_SECS: f64 = 3.0;
/// Target throughput for 100% efficiency (vehicles/min).
const TARGET_THROUGHPUT: f64 = 30.0;

// Fixed preemption plan
const PREEMPT_GREEN_SECS: u32 = 120;
const PREEMPT_RED_SECS: u32 = 10;
const PREEMPT_WAIT_BONUS_SECS: f64 = 60.0;

#[derive(Debug, Clone, Default)]
pub struct SignalController {
    default_config: JunctionConfig,
}

impl SignalController {
    pub fn new(default_config: JunctionConfig) -> Self {
        Self { default_config }
    }

    pub fn default_config(&self) -> &JunctionConfig {
        &self.default_config
    }

    /// Timing recommendation for the current density.
    ///
    /// `config` overrides the controller's default junction configuration.
    pub fn calculate_optimal_timing(
        &self,
        traffic: &TrafficDensity,
        config: Option<&JunctionConfig>,
        is_rush_hour: bool,
    ) -> SignalTimingResult {
        let config = config.unwrap_or(&self.default_config);

        let mut green_time = base_green_time(traffic, config);
        if is_rush_hour {
            green_time *= config.rush_hour_multiplier;
        }
        green_time *= traffic.congestion_level.green_multiplier();
        // max-then-min: an inverted config yields min_green_time
        green_time = green_time.min(config.max_green_time).max(config.min_green_time);

        let red_time = config
            .base_red_time
            .max(traffic.queue_length * QUEUE_CLEARANCE_SECS);

        let efficiency = calculate_efficiency(traffic, green_time);
        let wait_time_reduction = calculate_wait_time_reduction(traffic, green_time);

        // Published whole seconds never undercut the configured floors.
        let green_secs = round_secs(green_time).max(ceil_secs(config.min_green_time));
        let red_secs = round_secs(red_time).max(ceil_secs(config.base_red_time));

        debug!(
            "Timing [{}]: density={:.2} level={} rush={} → green={:.1}s red={:.1}s",
            config.id,
            traffic.density,
            traffic.congestion_level.as_str(),
            is_rush_hour,
            green_time,
            red_time
        );

        SignalTimingResult {
            green_time: green_secs,
            red_time: red_secs,
            cycle_time: green_secs + red_secs,
            efficiency,
            wait_time_reduction,
        }
    }

    /// Fixed life-safety plan, outside the junction's green bounds.
    pub fn preempt_for_emergency(&self, current: &SignalTimingResult) -> SignalTimingResult {
        info!(
            "🚨 Emergency preemption: green {}s → {}s",
            current.green_time, PREEMPT_GREEN_SECS
        );
        SignalTimingResult {
            green_time: PREEMPT_GREEN_SECS,
            red_time: PREEMPT_RED_SECS,
            cycle_time: PREEMPT_GREEN_SECS + PREEMPT_RED_SECS,
            efficiency: 100.0,
            wait_time_reduction: current.wait_time_reduction + PREEMPT_WAIT_BONUS_SECS,
        }
    }

    /// Rush hour by local wall clock.
    pub fn is_rush_hour(&self) -> bool {
        is_rush_hour_at(Local::now().hour())
    }
}

/// 07:00–09:59 and 17:00–19:59.
pub fn is_rush_hour_at(hour: u32) -> bool {
    (7..=9).contains(&hour) || (17..=19).contains(&hour)
}

fn base_green_time(traffic: &TrafficDensity, config: &JunctionConfig) -> f64 {
    let density_factor = traffic.density * 0.8;
    let vehicle_factor = (traffic.vehicle_count as f64 / VEHICLE_SATURATION).min(1.0) * 0.2;
    let range = config.max_green_time - config.min_green_time;

    config.min_green_time + range * (density_factor + vehicle_factor)
}

/// Throughput against target, capped at 100%.
fn calculate_efficiency(traffic: &TrafficDensity, green_time: f64) -> f64 {
    let throughput = traffic.vehicle_count as f64 * green_time / 60.0;
    (throughput / TARGET_THROUGHPUT * 100.0).min(100.0)
}

fn calculate_wait_time_reduction(traffic: &TrafficDensity, green_time: f64) -> f64 {
    let standard_wait = traffic.queue_length * STANDARD_WAIT_SECS;
    let optimized_wait = (traffic.queue_length * QUEUE_CLEARANCE_SECS).max(green_time * 0.3);
    (standard_wait - optimized_wait).max(0.0)
}

fn round_secs(secs: f64) -> u32 {
    secs.max(0.0).round() as u32
}

fn ceil_secs(secs: f64) -> u32 {
    secs.max(0.0).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CongestionLevel;

    fn traffic(vehicle_count: usize, density: f64, queue_length: f64) -> TrafficDensity {
        TrafficDensity {
            vehicle_count,
            density,
            congestion_level: CongestionLevel::from_density(density),
            average_speed: 50.0,
            queue_length,
        }
    }

    #[test]
    fn test_empty_junction_gets_min_green() {
        let c = SignalController::default();
        let t = c.calculate_optimal_timing(&traffic(0, 0.0, 0.0), None, false);
        assert_eq!(t.green_time, 15);
        assert_eq!(t.red_time, 30);
        assert_eq!(t.cycle_time, 45);
        assert_eq!(t.efficiency, 0.0);
        assert_eq!(t.wait_time_reduction, 0.0);
    }

    #[test]
    fn test_rush_hour_high_density_clamped_at_max() {
        let c = SignalController::default();
        let t = c.calculate_optimal_timing(&traffic(30, 0.9, 48.0), None, true);
        assert_eq!(t.green_time, 90);
        assert_eq!(t.red_time, 96);
        assert_eq!(t.cycle_time, t.green_time + t.red_time);
        assert_eq!(t.efficiency, 100.0);
    }

    #[test]
    fn test_medium_density_blend() {
        // 15 + 75 * (0.4 + 0.2) = 60, medium ×1.0
        let c = SignalController::default();
        let t = c.calculate_optimal_timing(&traffic(25, 0.5, 20.0), None, false);
        assert_eq!(t.green_time, 60);
        assert_eq!(t.red_time, 40);
        // throughput 25*60/60 = 25 → 83.3%
        assert!((t.efficiency - 250.0 / 3.0).abs() < 1e-9);
        // 60 - max(40, 18) = 20
        assert!((t.wait_time_reduction - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_custom_config_overrides_default() {
        let c = SignalController::default();
        let cfg = JunctionConfig {
            id: "narrow".to_string(),
            max_green_time: 40.0,
            min_green_time: 10.0,
            base_red_time: 20.0,
            rush_hour_multiplier: 1.5,
        };
        let t = c.calculate_optimal_timing(&traffic(30, 0.9, 5.0), Some(&cfg), false);
        assert_eq!(t.green_time, 40);
        assert_eq!(t.red_time, 20);
    }

    #[test]
    fn test_green_bounds_hold_across_grid() {
        let c = SignalController::default();
        let cfg = JunctionConfig::default();
        for count in [0usize, 1, 5, 19, 20, 50] {
            for step in 0..=20 {
                let density = step as f64 / 20.0;
                for rush in [false, true] {
                    let t = c.calculate_optimal_timing(
                        &traffic(count, density, count as f64 * 0.8),
                        None,
                        rush,
                    );
                    assert!(t.green_time as f64 >= cfg.min_green_time);
                    assert!(t.green_time as f64 <= cfg.max_green_time);
                    assert_eq!(t.cycle_time, t.green_time + t.red_time);
                    assert!((0.0..=100.0).contains(&t.efficiency));
                    assert!(t.wait_time_reduction >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_fractional_floors_round_up() {
        let c = SignalController::default();
        let junction = JunctionConfig {
            min_green_time: 15.4,
            base_red_time: 30.2,
            ..JunctionConfig::default()
        };
        let t = c.calculate_optimal_timing(&traffic(0, 0.0, 0.0), Some(&junction), false);
        assert_eq!(t.green_time, 16);
        assert_eq!(t.red_time, 31);
        assert_eq!(t.cycle_time, 47);
    }

    #[test]
    fn test_preemption_is_fixed() {
        let c = SignalController::default();
        for current in [
            c.calculate_optimal_timing(&traffic(0, 0.0, 0.0), None, false),
            c.calculate_optimal_timing(&traffic(40, 1.0, 80.0), None, true),
        ] {
            let p = c.preempt_for_emergency(&current);
            assert_eq!(p.green_time, 120);
            assert_eq!(p.red_time, 10);
            assert_eq!(p.cycle_time, 130);
            assert_eq!(p.efficiency, 100.0);
            assert_eq!(p.wait_time_reduction, current.wait_time_reduction + 60.0);
        }
    }

    #[test]
    fn test_rush_hour_windows() {
        let rush: Vec<u32> = (0..24).filter(|h| is_rush_hour_at(*h)).collect();
        assert_eq!(rush, vec![7, 8, 9, 17, 18, 19]);
    }
}
