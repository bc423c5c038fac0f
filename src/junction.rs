// src/junction.rs
//
// One refresh cycle for a single junction.
//
// Signal flow:
//   RawDetection[] ─┬→ confidence filter → density estimator ─┐
//                   └→ emergency monitor → alerts ────────────┼→ signal controller
//   wall clock → rush hour ──────────────────────────────────┘   (preempted if any
//                                                                  emergency is active)
//
// The evaluator owns the emergency registry, so successive cycles are
// serialized by `&mut self`. Share across threads behind one mutex or drive
// it from a single task.

use crate::config::Config;
use crate::density::DensityEstimator;
use crate::emergency::{EmergencyAlert, EmergencyMonitor, EmergencyVehicle};
use crate::pipeline::{EngineEvent, EngineMetrics, EventBus};
use crate::signal_timing::SignalController;
use crate::types::{
    CongestionLevel, JunctionConfig, RawDetection, SignalTimingResult, TrafficDensity,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a display layer needs after one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JunctionSnapshot {
    pub junction_id: String,
    /// Raw detections received this cycle
    pub detections: usize,
    pub traffic_density: TrafficDensity,
    pub signal_timing: SignalTimingResult,
    pub emergency_vehicles: Vec<EmergencyVehicle>,
    pub emergency_alerts: Vec<EmergencyAlert>,
    pub preempted: bool,
    pub rush_hour: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// Row upserted into the external junction statistics store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionStats {
    pub junction_id: String,
    pub avg_density: f64,
    pub recommended_green_time: u32,
    pub efficiency: f64,
    pub wait_time_reduction: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<&JunctionSnapshot> for JunctionStats {
    fn from(s: &JunctionSnapshot) -> Self {
        Self {
            junction_id: s.junction_id.clone(),
            avg_density: s.traffic_density.density,
            recommended_green_time: s.signal_timing.green_time,
            efficiency: s.signal_timing.efficiency,
            wait_time_reduction: s.signal_timing.wait_time_reduction,
            updated_at: s.evaluated_at,
        }
    }
}

pub struct JunctionEvaluator {
    junction: JunctionConfig,
    density: DensityEstimator,
    controller: SignalController,
    monitor: EmergencyMonitor,
    events: EventBus,
    metrics: EngineMetrics,
    last_level: Option<CongestionLevel>,
    last_timing: Option<SignalTimingResult>,
}

impl JunctionEvaluator {
    pub fn new(config: &Config, metrics: EngineMetrics) -> Self {
        Self {
            junction: config.junction.clone(),
            density: DensityEstimator::new(config.density.clone()),
            controller: SignalController::new(config.junction.clone()),
            monitor: EmergencyMonitor::new(config.emergency.clone()),
            events: EventBus::new(config.runtime.event_bus_capacity),
            metrics,
            last_level: None,
            last_timing: None,
        }
    }

    pub fn junction_id(&self) -> &str {
        &self.junction.id
    }

    /// Evaluate against the current wall clock.
    pub fn evaluate(&mut self, detections: &[RawDetection]) -> JunctionSnapshot {
        let rush_hour = self.controller.is_rush_hour();
        self.evaluate_at(detections, Utc::now(), rush_hour)
    }

    pub fn evaluate_at(
        &mut self,
        detections: &[RawDetection],
        now: DateTime<Utc>,
        rush_hour: bool,
    ) -> JunctionSnapshot {
        let start = Instant::now();
        let junction_id = self.junction.id.clone();

        let classified = self.density.filter_by_confidence_at(detections, now);
        let traffic = self.density.calculate_traffic_density(&classified);
        self.track_congestion(&traffic);

        let observation = self.monitor.observe_at(detections, now);
        for vehicle in &observation.fresh {
            self.metrics.inc(&self.metrics.emergency_vehicles_seen);
            self.events
                .publish(EngineEvent::EmergencyDetected(vehicle.clone()));
            let alert = self
                .monitor
                .create_emergency_alert_at(vehicle, &junction_id, now);
            self.metrics.inc(&self.metrics.alerts_raised);
            self.events.publish(EngineEvent::AlertRaised(alert));
        }
        let alerts = self.monitor.get_active_alerts_at(now);

        let mut timing =
            self.controller
                .calculate_optimal_timing(&traffic, Some(&self.junction), rush_hour);

        let preempted = self.monitor.has_active_emergency_vehicles_at(now);
        if preempted {
            let vehicle_id = self
                .monitor
                .get_highest_priority_vehicle_at(now)
                .map(|v| v.id);
            timing = self.apply_preemption(&timing, vehicle_id);
        }
        self.last_timing = Some(timing);

        self.metrics.inc(&self.metrics.cycles_evaluated);
        self.metrics
            .set_timing(&self.metrics.cycle_time_us, start.elapsed().as_micros() as u64);

        info!(
            "🚦 [{}] {} vehicles, density {:.2} ({}), green {}s / red {}s{}",
            junction_id,
            traffic.vehicle_count,
            traffic.density,
            traffic.congestion_level.as_str(),
            timing.green_time,
            timing.red_time,
            if preempted { " [PREEMPTED]" } else { "" }
        );

        JunctionSnapshot {
            junction_id,
            detections: detections.len(),
            traffic_density: traffic,
            signal_timing: timing,
            emergency_vehicles: observation.active,
            emergency_alerts: alerts,
            preempted,
            rush_hour,
            evaluated_at: now,
        }
    }

    /// Preempt the last published timing for an externally raised alert.
    ///
    /// Alerts addressed to another junction are ignored and yield `None`.
    pub fn handle_emergency_alert(&mut self, alert: &EmergencyAlert) -> Option<SignalTimingResult> {
        if alert.junction_id != self.junction.id {
            warn!(
                "[{}] ignoring alert for junction '{}' (vehicle {})",
                self.junction.id, alert.junction_id, alert.vehicle_id
            );
            return None;
        }

        let current = match self.last_timing {
            Some(t) => t,
            None => self.controller.calculate_optimal_timing(
                &TrafficDensity::default(),
                Some(&self.junction),
                false,
            ),
        };
        let timing = self.apply_preemption(&current, Some(alert.vehicle_id.clone()));
        self.last_timing = Some(timing);
        Some(timing)
    }

    pub fn last_timing(&self) -> Option<SignalTimingResult> {
        self.last_timing
    }

    pub fn monitor(&self) -> &EmergencyMonitor {
        &self.monitor
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain()
    }

    fn apply_preemption(
        &mut self,
        current: &SignalTimingResult,
        vehicle_id: Option<String>,
    ) -> SignalTimingResult {
        let timing = self.controller.preempt_for_emergency(current);
        self.metrics.inc(&self.metrics.preemptions);
        self.events.publish(EngineEvent::PreemptionApplied {
            junction_id: self.junction.id.clone(),
            vehicle_id,
            timing,
        });
        timing
    }

    fn track_congestion(&mut self, traffic: &TrafficDensity) {
        let level = traffic.congestion_level;
        match self.last_level {
            Some(prev) if prev != level => {
                debug!(
                    "[{}] congestion {} → {}",
                    self.junction.id,
                    prev.as_str(),
                    level.as_str()
                );
                self.events.publish(EngineEvent::CongestionChanged {
                    junction_id: self.junction.id.clone(),
                    from: prev,
                    to: level,
                    density: traffic.density,
                });
            }
            _ => {}
        }
        self.last_level = Some(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn car() -> RawDetection {
        RawDetection {
            width: 80.0,
            height: 60.0,
            confidence: Some(0.9),
            ..RawDetection::default()
        }
    }

    fn ambulance() -> RawDetection {
        RawDetection {
            track_id: Some("amb-1".to_string()),
            width: 90.0,
            height: 60.0,
            confidence: Some(0.95),
            color: Some("white".to_string()),
            has_flashing_lights: true,
            ..RawDetection::default()
        }
    }

    fn evaluator() -> JunctionEvaluator {
        JunctionEvaluator::new(&Config::default(), EngineMetrics::new())
    }

    #[test]
    fn test_quiet_cycle() {
        let mut e = evaluator();
        let snap = e.evaluate_at(&[], t0(), false);
        assert_eq!(snap.traffic_density.congestion_level, CongestionLevel::Low);
        assert_eq!(snap.signal_timing.green_time, 15);
        assert_eq!(snap.signal_timing.efficiency, 0.0);
        assert!(!snap.preempted);
        assert!(snap.emergency_vehicles.is_empty());
        assert!(e.drain_events().is_empty());
    }

    #[test]
    fn test_medium_traffic_cycle() {
        let mut e = evaluator();
        let snap = e.evaluate_at(&vec![car(); 25], t0(), false);
        assert_eq!(snap.detections, 25);
        assert_eq!(snap.traffic_density.congestion_level, CongestionLevel::Medium);
        assert_eq!(snap.signal_timing.green_time, 60);
        assert_eq!(snap.signal_timing.red_time, 40);

        let stats = JunctionStats::from(&snap);
        assert_eq!(stats.junction_id, "default");
        assert_eq!(stats.recommended_green_time, 60);
        assert!((stats.avg_density - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_emergency_preempts_and_alerts() {
        let metrics = EngineMetrics::new();
        let mut e = JunctionEvaluator::new(&Config::default(), metrics.clone());
        let mut batch = vec![car(); 5];
        batch.push(ambulance());

        let snap = e.evaluate_at(&batch, t0(), false);
        assert!(snap.preempted);
        assert_eq!(snap.signal_timing.green_time, 120);
        assert_eq!(snap.signal_timing.cycle_time, 130);
        assert_eq!(snap.emergency_vehicles.len(), 1);
        assert_eq!(snap.emergency_alerts.len(), 1);
        assert_eq!(snap.emergency_alerts[0].junction_id, "default");

        let events = e.drain_events();
        assert!(events
            .iter()
            .any(|ev| matches!(ev, EngineEvent::EmergencyDetected(_))));
        assert!(events.iter().any(|ev| matches!(
            ev,
            EngineEvent::PreemptionApplied { vehicle_id: Some(id), .. } if id == "emergency-amb-1"
        )));

        let summary = metrics.summary();
        assert_eq!(summary.preemptions, 1);
        assert_eq!(summary.alerts_raised, 1);
        assert_eq!(summary.cycles_evaluated, 1);
    }

    #[test]
    fn test_preemption_lapses_after_ttl() {
        let mut e = evaluator();
        e.evaluate_at(&[ambulance()], t0(), false);

        let still = e.evaluate_at(&[], t0() + Duration::seconds(60), false);
        assert!(still.preempted, "vehicle is still within its TTL");
        assert!(still.emergency_alerts.len() == 1);

        let later = e.evaluate_at(&[], t0() + Duration::seconds(121), false);
        assert!(!later.preempted);
        assert!(later.emergency_vehicles.is_empty());
        assert_eq!(later.signal_timing.green_time, 15);
        // alert is still inside the 5-minute window
        assert_eq!(later.emergency_alerts.len(), 1);
    }

    #[test]
    fn test_rush_hour_flag_flows_through() {
        let mut e = evaluator();
        let heavy = vec![car(); 45];
        let snap = e.evaluate_at(&heavy, t0(), true);
        assert!(snap.rush_hour);
        assert_eq!(snap.signal_timing.green_time, 90);
    }

    #[test]
    fn test_congestion_change_event() {
        let mut e = evaluator();
        e.evaluate_at(&[], t0(), false);
        e.evaluate_at(&vec![car(); 40], t0(), false);
        let events = e.drain_events();
        assert!(events.iter().any(|ev| matches!(
            ev,
            EngineEvent::CongestionChanged {
                from: CongestionLevel::Low,
                to: CongestionLevel::High,
                ..
            }
        )));
    }

    #[test]
    fn test_handle_emergency_alert_preempts_last_timing() {
        let mut e = evaluator();
        let snap = e.evaluate_at(&vec![car(); 25], t0(), false);
        let alert = EmergencyAlert {
            vehicle_id: "manual".to_string(),
            junction_id: "default".to_string(),
            message: "Police Vehicle approaching from north. ETA: 20s".to_string(),
            action: crate::emergency::AlertAction::ClearPath,
            duration: 30,
            timestamp: t0(),
        };
        let timing = e.handle_emergency_alert(&alert).unwrap();
        assert_eq!(timing.green_time, 120);
        assert_eq!(
            timing.wait_time_reduction,
            snap.signal_timing.wait_time_reduction + 60.0
        );
        assert_eq!(e.last_timing(), Some(timing));
    }

    #[test]
    fn test_alert_for_other_junction_is_ignored() {
        let mut e = evaluator();
        let snap = e.evaluate_at(&vec![car(); 25], t0(), false);
        let alert = EmergencyAlert {
            vehicle_id: "manual".to_string(),
            junction_id: "elsewhere".to_string(),
            message: "Ambulance approaching from east. ETA: 5s".to_string(),
            action: crate::emergency::AlertAction::Preempt,
            duration: 60,
            timestamp: t0(),
        };
        assert!(e.handle_emergency_alert(&alert).is_none());
        assert_eq!(e.last_timing(), Some(snap.signal_timing));
        assert!(e.drain_events().iter().all(|ev| !matches!(
            ev,
            EngineEvent::PreemptionApplied { .. }
        )));
    }
}
