// src/pipeline/event_bus.rs
//
// Decoupled event stream. The evaluator publishes what happened during a
// cycle; display/persistence collaborators drain it on their own schedule.

use crate::emergency::{EmergencyAlert, EmergencyVehicle};
use crate::types::{CongestionLevel, SignalTimingResult};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    EmergencyDetected(EmergencyVehicle),

    AlertRaised(EmergencyAlert),

    PreemptionApplied {
        junction_id: String,
        vehicle_id: Option<String>,
        timing: SignalTimingResult,
    },

    CongestionChanged {
        junction_id: String,
        from: CongestionLevel,
        to: CongestionLevel,
        density: f64,
    },
}

pub struct EventBus {
    events: VecDeque<EngineEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: EngineEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}
