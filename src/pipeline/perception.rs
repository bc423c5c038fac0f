// src/pipeline/perception.rs
//
// Per-frame perception: frame → tensor → external model → decode → NMS.
// Inference itself lives behind `InferenceBackend`; this stage only owns the
// numeric pre/post-processing around it.

use super::metrics::EngineMetrics;
use crate::config::DecoderConfig;
use crate::decoder::{DetectionDecoder, ModelOutput};
use crate::preprocessing::{frame_to_tensor, tensor_shape};
use crate::suppression::non_max_suppression;
use crate::types::Detection;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::debug;

/// External object-detection model.
pub trait InferenceBackend {
    /// Run the model on a CHW tensor of the given shape.
    fn infer(&mut self, input: &[f32], shape: &[usize]) -> Result<ModelOutput>;
}

pub struct PerceptionPipeline {
    decoder: DetectionDecoder,
    metrics: EngineMetrics,
}

impl PerceptionPipeline {
    pub fn new(config: DecoderConfig, metrics: EngineMetrics) -> Self {
        Self {
            decoder: DetectionDecoder::new(config),
            metrics,
        }
    }

    pub fn decoder(&self) -> &DetectionDecoder {
        &self.decoder
    }

    /// Decode and suppress one model output for a `frame_width`×`frame_height` source.
    pub fn process(&self, output: &ModelOutput, frame_width: usize, frame_height: usize) -> Vec<Detection> {
        let start = Instant::now();

        let decoded = self
            .decoder
            .decode(&output.data, &output.shape, frame_width, frame_height);
        let decoded_count = decoded.len();
        let kept = non_max_suppression(decoded, self.decoder.config().iou_threshold);

        self.metrics.inc(&self.metrics.frames_decoded);
        self.metrics
            .add(&self.metrics.candidates_decoded, decoded_count as u64);
        self.metrics.add(&self.metrics.detections_kept, kept.len() as u64);
        self.metrics.add(
            &self.metrics.detections_suppressed,
            (decoded_count - kept.len()) as u64,
        );
        self.metrics
            .set_timing(&self.metrics.decode_time_us, start.elapsed().as_micros() as u64);

        debug!(
            "Frame {}x{}: {} vehicle candidates → {} after NMS",
            frame_width,
            frame_height,
            decoded_count,
            kept.len()
        );
        kept
    }

    /// Full path for an RGB frame through an external model.
    pub fn detect_frame<B: InferenceBackend>(
        &self,
        backend: &mut B,
        rgb: &[u8],
        width: usize,
        height: usize,
    ) -> Result<Vec<Detection>> {
        let input_size = self.decoder.config().input_size;
        let input = frame_to_tensor(rgb, width, height, input_size);
        if input.is_empty() {
            anyhow::bail!(
                "Frame buffer of {} bytes does not hold a {}x{} RGB image",
                rgb.len(),
                width,
                height
            );
        }

        let output = backend
            .infer(&input, &tensor_shape(input_size))
            .context("Inference backend failed")?;

        Ok(self.process(&output, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a fixed [1, N, 84] output with two overlapping cars and a bus.
    struct FixedBackend {
        calls: usize,
    }

    impl InferenceBackend for FixedBackend {
        fn infer(&mut self, input: &[f32], shape: &[usize]) -> Result<ModelOutput> {
            self.calls += 1;
            assert_eq!(input.len(), shape.iter().product::<usize>());
            Ok(sample_output())
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn infer(&mut self, _input: &[f32], _shape: &[usize]) -> Result<ModelOutput> {
            anyhow::bail!("model unavailable")
        }
    }

    fn sample_output() -> ModelOutput {
        let rows = [
            (100.0, 100.0, 80.0, 60.0, 2usize, 0.9f32),
            (102.0, 101.0, 80.0, 60.0, 2, 0.8),
            (400.0, 300.0, 120.0, 90.0, 5, 0.7),
        ];
        let n = rows.len();
        let mut data = vec![0.0f32; n * 84];
        for (r, &(cx, cy, w, h, class, score)) in rows.iter().enumerate() {
            let base = r * 84;
            data[base] = cx;
            data[base + 1] = cy;
            data[base + 2] = w;
            data[base + 3] = h;
            data[base + 4 + class] = score;
        }
        ModelOutput {
            data,
            shape: vec![1, n, 84],
        }
    }

    #[test]
    fn test_process_decodes_and_suppresses() {
        let metrics = EngineMetrics::new();
        let pipeline = PerceptionPipeline::new(DecoderConfig::default(), metrics.clone());
        let dets = pipeline.process(&sample_output(), 640, 640);

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].label, "car");
        assert!((dets[0].score - 0.9).abs() < 1e-6);
        assert_eq!(dets[1].label, "bus");

        let summary = metrics.summary();
        assert_eq!(summary.frames_decoded, 1);
        assert_eq!(summary.candidates_decoded, 3);
        assert_eq!(summary.detections_kept, 2);
        assert_eq!(summary.detections_suppressed, 1);
    }

    #[test]
    fn test_detect_frame_runs_backend() {
        let pipeline = PerceptionPipeline::new(DecoderConfig::default(), EngineMetrics::new());
        let mut backend = FixedBackend { calls: 0 };
        let frame = vec![90u8; 64 * 48 * 3];
        let dets = pipeline.detect_frame(&mut backend, &frame, 64, 48).unwrap();
        assert_eq!(backend.calls, 1);
        assert_eq!(dets.len(), 2);
    }

    #[test]
    fn test_detect_frame_propagates_errors() {
        let pipeline = PerceptionPipeline::new(DecoderConfig::default(), EngineMetrics::new());
        let frame = vec![0u8; 8 * 8 * 3];
        assert!(pipeline
            .detect_frame(&mut FailingBackend, &frame, 8, 8)
            .is_err());
        assert!(pipeline
            .detect_frame(&mut FixedBackend { calls: 0 }, &frame[..10], 8, 8)
            .is_err());
    }
}
