// src/main.rs

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use traffic_signal_engine::capture::{find_capture_files, load_capture};
use traffic_signal_engine::pipeline::{EngineMetrics, PerceptionPipeline};
use traffic_signal_engine::{Config, JunctionEvaluator, JunctionStats, RawDetection};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("SIGNAL_ENGINE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚦 Traffic Signal Engine Starting");
    info!(
        "Junction '{}': green {}-{}s, base red {}s, refresh every {}s",
        config.junction.id,
        config.junction.min_green_time,
        config.junction.max_green_time,
        config.junction.base_red_time,
        config.runtime.refresh_interval_secs
    );

    let metrics = EngineMetrics::new();
    let perception = PerceptionPipeline::new(config.decoder.clone(), metrics.clone());
    let mut evaluators: HashMap<String, JunctionEvaluator> = HashMap::new();

    let captures = find_capture_files(&config.runtime.input_dir)?;
    if captures.is_empty() {
        warn!("No captures found in {}", config.runtime.input_dir);
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(
        config.runtime.refresh_interval_secs.max(1),
    ));

    for (idx, path) in captures.iter().enumerate() {
        ticker.tick().await;
        info!(
            "Cycle {}/{}: {}",
            idx + 1,
            captures.len(),
            path.display()
        );

        let capture = match load_capture(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Skipping capture: {:#}", e);
                continue;
            }
        };

        let mut detections = capture.detections;
        if let Some(frame) = &capture.frame {
            let decoded = perception.process(&frame.output, frame.width, frame.height);
            detections.extend(decoded.iter().map(RawDetection::from));
        }

        let junction_id = capture
            .junction_id
            .unwrap_or_else(|| config.junction.id.clone());
        let evaluator = evaluators.entry(junction_id.clone()).or_insert_with(|| {
            let mut junction_config = config.clone();
            junction_config.junction.id = junction_id;
            JunctionEvaluator::new(&junction_config, metrics.clone())
        });

        let snapshot = evaluator.evaluate(&detections);
        info!("{}", serde_json::to_string(&JunctionStats::from(&snapshot))?);
        debug!("{}", serde_json::to_string_pretty(&snapshot)?);

        for event in evaluator.drain_events() {
            debug!("{:?}", event);
        }
    }

    info!("✓ Replay complete");
    info!("{}", serde_json::to_string_pretty(&metrics.summary())?);

    Ok(())
}
