// src/pipeline/metrics.rs
//
// Counters and last-seen timings for the perception and evaluation stages.
// Cloning shares the underlying counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub frames_decoded: Arc<AtomicU64>,
    pub candidates_decoded: Arc<AtomicU64>,
    pub detections_kept: Arc<AtomicU64>,
    pub detections_suppressed: Arc<AtomicU64>,
    pub cycles_evaluated: Arc<AtomicU64>,
    pub preemptions: Arc<AtomicU64>,
    pub emergency_vehicles_seen: Arc<AtomicU64>,
    pub alerts_raised: Arc<AtomicU64>,
    pub decode_time_us: Arc<AtomicU64>,
    pub cycle_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            frames_decoded: Arc::new(AtomicU64::new(0)),
            candidates_decoded: Arc::new(AtomicU64::new(0)),
            detections_kept: Arc::new(AtomicU64::new(0)),
            detections_suppressed: Arc::new(AtomicU64::new(0)),
            cycles_evaluated: Arc::new(AtomicU64::new(0)),
            preemptions: Arc::new(AtomicU64::new(0)),
            emergency_vehicles_seen: Arc::new(AtomicU64::new(0)),
            alerts_raised: Arc::new(AtomicU64::new(0)),
            decode_time_us: Arc::new(AtomicU64::new(0)),
            cycle_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            candidates_decoded: self.candidates_decoded.load(Ordering::Relaxed),
            detections_kept: self.detections_kept.load(Ordering::Relaxed),
            detections_suppressed: self.detections_suppressed.load(Ordering::Relaxed),
            cycles_evaluated: self.cycles_evaluated.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            emergency_vehicles_seen: self.emergency_vehicles_seen.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            last_decode_us: self.decode_time_us.load(Ordering::Relaxed),
            last_cycle_us: self.cycle_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_decoded: u64,
    pub candidates_decoded: u64,
    pub detections_kept: u64,
    pub detections_suppressed: u64,
    pub cycles_evaluated: u64,
    pub preemptions: u64,
    pub emergency_vehicles_seen: u64,
    pub alerts_raised: u64,
    pub last_decode_us: u64,
    pub last_cycle_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = EngineMetrics::new();
        let other = metrics.clone();
        other.inc(&other.cycles_evaluated);
        metrics.add(&metrics.detections_kept, 5);
        metrics.set_timing(&metrics.cycle_time_us, 42);

        let summary = metrics.summary();
        assert_eq!(summary.cycles_evaluated, 1);
        assert_eq!(other.summary().detections_kept, 5);
        assert_eq!(summary.last_cycle_us, 42);
    }
}
