// src/suppression.rs
//
// Greedy non-maximum suppression. O(n²) in the number of candidates that
// survived the confidence threshold, which is small per frame.

use crate::types::{BoundingBox, Detection};
use tracing::debug;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Intersection-over-union of two rectangles. Zero when the union is empty.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.xmin.max(b.xmin);
    let y1 = a.ymin.max(b.ymin);
    let x2 = a.xmax.min(b.xmax);
    let y2 = a.ymax.min(b.ymax);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Keep the highest-scoring detection of every overlapping cluster.
///
/// A candidate survives iff its IoU with every already-kept detection is
/// `<= iou_threshold`. The sort is stable, so equal scores keep input order.
/// Ordering is total: a NaN score sorts ahead of every finite one.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }

    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let total = detections.len();
    let mut keep: Vec<Detection> = Vec::with_capacity(total);

    for candidate in detections {
        if keep
            .iter()
            .all(|kept| iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }

    if keep.len() < total {
        debug!("NMS suppressed {} of {} detections", total - keep.len(), total);
    }

    keep
}
