use crate::types::DetectionCandidate;
use std::collections::HashMap;

/// Number of leading values per prediction row: cx, cy, w, h, objectness.
const BOX_FIELDS: usize = 5;

pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

pub struct PostProcessor {
    pub score_floor: f32,
    pub iou_threshold: f32,
}

impl PostProcessor {
    pub fn new(score_floor: f32, iou_threshold: f32) -> Self {
        Self {
            score_floor,
            iou_threshold,
        }
    }

    /// Decode one image's YOLOv5 output and apply per-class NMS.
    ///
    /// `predictions` is `[boxes, 5 + num_classes]`, boxes in cxcywh input pixels.
    /// Returned candidates are in original image pixels, highest score first.
    #[tracing::instrument(
        skip_all,
        fields(rows = predictions.shape().first().copied().unwrap_or(0))
    )]
    pub fn parse_detections(
        &self,
        predictions: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<DetectionCandidate>> {
        let shape = predictions.shape();
        if shape.len() != 2 {
            anyhow::bail!("Expected 2D predictions per image, got {}D", shape.len());
        }
        if shape[1] <= BOX_FIELDS {
            anyhow::bail!(
                "Prediction rows have {} values, need at least {}",
                shape[1],
                BOX_FIELDS + 1
            );
        }

        let num_boxes = shape[0];
        let num_classes = shape[1] - BOX_FIELDS;
        let mut candidates = Vec::new();

        for i in 0..num_boxes {
            let objectness = predictions[[i, 4]];
            if objectness <= self.score_floor {
                continue;
            }

            // argmax over class scores
            let mut best_score = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 0..num_classes {
                let score = predictions[[i, BOX_FIELDS + c]];
                if score > best_score {
                    best_score = score;
                    class_id = c;
                }
            }

            let confidence = objectness * best_score;
            if confidence <= self.score_floor {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(
                predictions[[i, 0]],
                predictions[[i, 1]],
                predictions[[i, 2]],
                predictions[[i, 3]],
            );

            candidates.push(DetectionCandidate {
                bbox: [x1, y1, x2, y2],
                confidence,
                class_id: class_id as u32,
            });
        }

        tracing::trace!(candidates = candidates.len(), "Candidates above score floor");

        let mut kept = nms(candidates, self.iou_threshold);
        for candidate in &mut kept {
            candidate.bbox = to_original(candidate.bbox, transform);
        }

        Ok(kept)
    }
}

/// Greedy non-max suppression, applied separately per class.
///
/// Output is sorted by descending confidence.
pub fn nms(candidates: Vec<DetectionCandidate>, iou_threshold: f32) -> Vec<DetectionCandidate> {
    let mut by_class: HashMap<u32, Vec<DetectionCandidate>> = HashMap::new();
    for candidate in candidates {
        by_class.entry(candidate.class_id).or_default().push(candidate);
    }

    let mut kept = Vec::new();
    for (_, mut group) in by_class {
        group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            kept.push(group[i]);
            for j in (i + 1)..group.len() {
                if !suppressed[j] && group[i].iou(&group[j]) > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
    }

    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept
}

/// Undo letterboxing and clamp to the original image bounds.
fn to_original(bbox: [f32; 4], transform: &TransformParams) -> [f32; 4] {
    let w = transform.orig_width as f32;
    let h = transform.orig_height as f32;
    [
        ((bbox[0] - transform.offset_x) / transform.scale).clamp(0.0, w),
        ((bbox[1] - transform.offset_y) / transform.scale).clamp(0.0, h),
        ((bbox[2] - transform.offset_x) / transform.scale).clamp(0.0, w),
        ((bbox[3] - transform.offset_y) / transform.scale).clamp(0.0, h),
    ]
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}
