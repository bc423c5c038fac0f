// src/pipeline/mod.rs

pub mod event_bus;
pub mod metrics;
pub mod perception;

pub use event_bus::{EngineEvent, EventBus};
pub use metrics::{EngineMetrics, MetricsSummary};
pub use perception::{InferenceBackend, PerceptionPipeline};
