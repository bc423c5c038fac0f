// src/decoder.rs
//
// YOLOv8-style output decoding.
//
// The model emits, per candidate, [cx, cy, w, h, score_0 .. score_{C-1}] in
// input-resolution pixels. Depending on the export the buffer is laid out
// channel-first ([1, 4+C, N]) or per-candidate ([1, N, 4+C]). Anything else
// goes through a compatibility shim that reads the last two axes as
// [N, channels] and falls back to the 8400×84 geometry of a 640px COCO
// export when those axes are missing.

use crate::config::DecoderConfig;
use crate::types::{BoundingBox, Detection};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// COCO class names (80 classes), indexed by model class id.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Box geometry channels preceding the class scores.
const BOX_CHANNELS: usize = 4;

/// Flat model output plus its declared shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

/// How candidate rows are laid out in the flat buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// [1, channels, N]
    ChannelsFirst { rows: usize, channels: usize },
    /// [1, N, channels]
    RowMajor { rows: usize, channels: usize },
    /// Unrecognized shape read as [.., N, channels]
    Fallback { rows: usize, channels: usize },
}

impl OutputLayout {
    pub fn rows(&self) -> usize {
        match *self {
            Self::ChannelsFirst { rows, .. }
            | Self::RowMajor { rows, .. }
            | Self::Fallback { rows, .. } => rows,
        }
    }

    pub fn channels(&self) -> usize {
        match *self {
            Self::ChannelsFirst { channels, .. }
            | Self::RowMajor { channels, .. }
            | Self::Fallback { channels, .. } => channels,
        }
    }

    /// Cap the row count at what a buffer of `len` values holds, so
    /// `index` stays in bounds for every row/channel the loop visits.
    pub fn fit_to(self, len: usize) -> Self {
        let cap = len / self.channels().max(1);
        match self {
            Self::ChannelsFirst { rows, channels } => Self::ChannelsFirst {
                rows: rows.min(cap),
                channels,
            },
            Self::RowMajor { rows, channels } => Self::RowMajor {
                rows: rows.min(cap),
                channels,
            },
            Self::Fallback { rows, channels } => Self::Fallback {
                rows: rows.min(cap),
                channels,
            },
        }
    }

    fn index(&self, row: usize, channel: usize) -> usize {
        match *self {
            Self::ChannelsFirst { rows, .. } => channel * rows + row,
            Self::RowMajor { channels, .. } | Self::Fallback { channels, .. } => {
                row * channels + channel
            }
        }
    }
}

pub struct DetectionDecoder {
    config: DecoderConfig,
    vocabulary: &'static [&'static str],
}

impl DetectionDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            vocabulary: COCO_CLASSES,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Expected channel count: box geometry plus one score per known class.
    pub fn expected_channels(&self) -> usize {
        BOX_CHANNELS + self.vocabulary.len()
    }

    pub fn detect_layout(&self, shape: &[usize]) -> OutputLayout {
        let channels = self.expected_channels();

        if shape.len() == 3 && shape[1] == channels {
            return OutputLayout::ChannelsFirst {
                rows: shape[2],
                channels,
            };
        }
        if shape.len() == 3 && shape[2] == channels {
            return OutputLayout::RowMajor {
                rows: shape[1],
                channels,
            };
        }

        let rows = shape
            .len()
            .checked_sub(2)
            .and_then(|i| shape.get(i).copied())
            .filter(|&n| n > 0)
            .unwrap_or(self.config.fallback_rows);
        let channels = shape
            .last()
            .copied()
            .filter(|&n| n > 0)
            .unwrap_or(self.config.fallback_channels);

        debug!(
            "Unrecognized output shape {:?}, reading as [{}, {}]",
            shape, rows, channels
        );
        OutputLayout::Fallback { rows, channels }
    }

    /// Decode a raw output buffer into vehicle detections in source-frame pixels.
    ///
    /// Pure function of its inputs. A shape declaring more rows than the
    /// buffer holds decodes only the rows that fit.
    pub fn decode(
        &self,
        output: &[f32],
        shape: &[usize],
        frame_width: usize,
        frame_height: usize,
    ) -> Vec<Detection> {
        let declared = self.detect_layout(shape);
        let layout = declared.fit_to(output.len());
        if layout.rows() < declared.rows() {
            debug!(
                "Shape {:?} declares {} rows, buffer of {} holds {}",
                shape,
                declared.rows(),
                output.len(),
                layout.rows()
            );
        }
        let input_size = self.config.input_size.max(1) as f32;
        let sx = frame_width as f32 / input_size;
        let sy = frame_height as f32 / input_size;

        let value = |row: usize, channel: usize| output.get(layout.index(row, channel)).copied();

        let mut candidates = Vec::new();

        for r in 0..layout.rows() {
            let (Some(cx), Some(cy), Some(w), Some(h)) =
                (value(r, 0), value(r, 1), value(r, 2), value(r, 3))
            else {
                continue;
            };

            let mut best_score = 0.0f32;
            let mut best_class: Option<usize> = None;
            for c in BOX_CHANNELS..layout.channels() {
                if let Some(score) = value(r, c) {
                    if score > best_score {
                        best_score = score;
                        best_class = Some(c - BOX_CHANNELS);
                    }
                }
            }

            let Some(class_id) = best_class else {
                continue;
            };
            if best_score < self.config.confidence_threshold {
                continue;
            }

            candidates.push(Detection {
                label: self.label_for(class_id),
                score: best_score,
                bbox: BoundingBox::from_center(cx, cy, w, h).scaled(sx, sy),
            });
        }

        // Class filter runs after argmax so non-vehicle scores still compete.
        let total = candidates.len();
        let vehicles: Vec<Detection> = candidates
            .into_iter()
            .filter(|d| self.config.vehicle_labels.iter().any(|l| *l == d.label))
            .collect();

        debug!(
            "Decoded {} candidates ({} vehicles) from {:?}",
            total,
            vehicles.len(),
            layout
        );
        vehicles
    }

    fn label_for(&self, class_id: usize) -> String {
        self.vocabulary
            .get(class_id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("cls_{}", class_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 6;
    const CH: usize = 84;

    /// Build a channel-first [1, 84, N] buffer with one scored class per row.
    fn channels_first(rows: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let mut buf = vec![0.0f32; CH * N];
        for (r, &(cx, cy, w, h, class, score)) in rows.iter().enumerate() {
            buf[r] = cx;
            buf[N + r] = cy;
            buf[2 * N + r] = w;
            buf[3 * N + r] = h;
            buf[(4 + class) * N + r] = score;
        }
        buf
    }

    fn row_major(rows: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let mut buf = vec![0.0f32; CH * N];
        for (r, &(cx, cy, w, h, class, score)) in rows.iter().enumerate() {
            let base = r * CH;
            buf[base] = cx;
            buf[base + 1] = cy;
            buf[base + 2] = w;
            buf[base + 3] = h;
            buf[base + 4 + class] = score;
        }
        buf
    }

    fn decoder() -> DetectionDecoder {
        DetectionDecoder::new(DecoderConfig::default())
    }

    #[test]
    fn test_layout_detection() {
        let d = decoder();
        assert_eq!(
            d.detect_layout(&[1, 84, 8400]),
            OutputLayout::ChannelsFirst { rows: 8400, channels: 84 }
        );
        assert_eq!(
            d.detect_layout(&[1, 8400, 84]),
            OutputLayout::RowMajor { rows: 8400, channels: 84 }
        );
        assert_eq!(
            d.detect_layout(&[100, 84]),
            OutputLayout::Fallback { rows: 100, channels: 84 }
        );
        assert_eq!(
            d.detect_layout(&[]),
            OutputLayout::Fallback { rows: 8400, channels: 84 }
        );
    }

    #[test]
    fn test_decode_channels_first_scales_to_source() {
        // car (class 2) centered at (320, 320), 64×32 in input space
        let buf = channels_first(&[(320.0, 320.0, 64.0, 32.0, 2, 0.9)]);
        let dets = decoder().decode(&buf, &[1, CH, N], 1280, 720);

        assert_eq!(dets.len(), 1);
        let det = &dets[0];
        assert_eq!(det.label, "car");
        assert!((det.score - 0.9).abs() < 1e-6);
        // x scale = 2.0, y scale = 1.125
        assert!((det.bbox.xmin - 576.0).abs() < 1e-3);
        assert!((det.bbox.xmax - 704.0).abs() < 1e-3);
        assert!((det.bbox.ymin - 342.0).abs() < 1e-3);
        assert!((det.bbox.ymax - 378.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_row_major_matches_channels_first() {
        let rows = [
            (100.0, 100.0, 50.0, 40.0, 7, 0.8),
            (400.0, 200.0, 60.0, 60.0, 5, 0.6),
        ];
        let a = decoder().decode(&channels_first(&rows), &[1, CH, N], 640, 640);
        let b = decoder().decode(&row_major(&rows), &[1, N, CH], 640, 640);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].label, "truck");
        assert_eq!(a[1].label, "bus");
    }

    #[test]
    fn test_low_confidence_dropped() {
        let buf = channels_first(&[(100.0, 100.0, 20.0, 20.0, 2, 0.2)]);
        assert!(decoder().decode(&buf, &[1, CH, N], 640, 640).is_empty());
    }

    #[test]
    fn test_non_vehicle_dropped_after_argmax() {
        // person wins the argmax over a weaker car score → dropped entirely
        let mut buf = channels_first(&[(100.0, 100.0, 20.0, 40.0, 0, 0.9)]);
        buf[(4 + 2) * N] = 0.5;
        assert!(decoder().decode(&buf, &[1, CH, N], 640, 640).is_empty());
    }

    #[test]
    fn test_fallback_shape_reads_row_major() {
        let rows = [(200.0, 200.0, 40.0, 40.0, 3, 0.7)];
        let dets = decoder().decode(&row_major(&rows), &[N, CH], 640, 640);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "motorcycle");
    }

    #[test]
    fn test_truncated_buffer_does_not_invent_detections() {
        // Declared 8400 candidates but buffer only holds six
        let buf = row_major(&[(200.0, 200.0, 40.0, 40.0, 2, 0.7)]);
        let dets = decoder().decode(&buf, &[1, 8400, CH], 640, 640);
        assert_eq!(dets.len(), 1);
    }

    #[test]
    fn test_oversized_declared_shape_is_capped() {
        let d = decoder();
        let buf = vec![0.0f32; 2 * CH];
        assert!(d.decode(&buf, &[1, CH, usize::MAX / 2], 640, 640).is_empty());
        assert!(d.decode(&buf, &[1, usize::MAX / 2, CH], 640, 640).is_empty());
        assert!(d.decode(&buf, &[usize::MAX, usize::MAX], 640, 640).is_empty());

        let layout = d.detect_layout(&[1, CH, usize::MAX / 2]).fit_to(buf.len());
        assert_eq!(layout, OutputLayout::ChannelsFirst { rows: 2, channels: CH });
    }

    #[test]
    fn test_overdeclared_row_major_keeps_rows_that_fit() {
        let buf = row_major(&[(200.0, 200.0, 40.0, 40.0, 2, 0.7)]);
        let dets = decoder().decode(&buf, &[1, usize::MAX / 2, CH], 640, 640);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "car");
    }

    #[test]
    fn test_unknown_class_gets_synthetic_label() {
        let d = decoder();
        assert_eq!(d.label_for(2), "car");
        assert_eq!(d.label_for(95), "cls_95");
    }

    #[test]
    fn test_decode_is_deterministic() {
        let rows = [
            (100.0, 100.0, 50.0, 40.0, 2, 0.8),
            (104.0, 102.0, 50.0, 40.0, 2, 0.7),
            (500.0, 300.0, 30.0, 60.0, 1, 0.55),
        ];
        let buf = channels_first(&rows);
        let a = decoder().decode(&buf, &[1, CH, N], 1920, 1080);
        let b = decoder().decode(&buf, &[1, CH, N], 1920, 1080);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }
}
