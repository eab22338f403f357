// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Utility functions for the decoding pipeline

use crate::results::Proposal;

/// Calculate `IoU` (Intersection over Union) between two bounding boxes
///
/// # Arguments
///
/// * `box1` - First bounding box [x1, y1, x2, y2]
/// * `box2` - Second bounding box [x1, y1, x2, y2]
///
/// # Returns
///
/// `IoU` value between 0.0 and 1.0, or 0.0 when the union is empty
#[must_use]
pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = ((x2 - x1).max(0.0)) * ((y2 - y1).max(0.0));

    let area1 = (box1[2] - box1[0]).max(0.0) * (box1[3] - box1[1]).max(0.0);
    let area2 = (box2[2] - box2[0]).max(0.0) * (box2[3] - box2[1]).max(0.0);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy Non-Maximum Suppression over proposals already sorted by descending confidence.
///
/// Each candidate is compared against the boxes kept so far. It is dropped when its `IoU`
/// with a kept box of the same class (any class when `agnostic`) is strictly greater than
/// `iou_threshold`. Stops once `max_detections` boxes are kept.
///
/// # Returns
///
/// Indices of kept proposals, in input order
#[must_use]
pub fn nms_sorted(
    proposals: &[Proposal],
    iou_threshold: f32,
    agnostic: bool,
    max_detections: usize,
) -> Vec<usize> {
    let mut keep: Vec<usize> = Vec::new();
    let mut kept_boxes: Vec<([f32; 4], usize)> = Vec::new();

    for (i, candidate) in proposals.iter().enumerate() {
        if keep.len() >= max_detections {
            break;
        }

        let corners = candidate.bbox.xyxy();
        let suppressed = kept_boxes.iter().any(|(kept, class_id)| {
            (agnostic || *class_id == candidate.class_id)
                && calculate_iou(kept, &corners) > iou_threshold
        });

        if !suppressed {
            keep.push(i);
            kept_boxes.push((corners, candidate.class_id));
        }
    }

    keep
}

/// Simple pluralization for common COCO class names.
#[must_use]
pub fn pluralize(word: &str) -> String {
    match word {
        "person" => "persons".to_string(),
        "bus" => "buses".to_string(),
        "knife" => "knives".to_string(),
        "mouse" => "mice".to_string(),
        "sheep" => "sheep".to_string(),
        "skis" => "skis".to_string(),
        _ => {
            if word.ends_with('s') || word.ends_with("ch") || word.ends_with("sh") {
                format!("{word}es")
            } else if word.ends_with('y') && !word.ends_with("ey") && !word.ends_with("ay") {
                format!("{}ies", &word[..word.len() - 1])
            } else {
                format!("{word}s")
            }
        }
    }
}
