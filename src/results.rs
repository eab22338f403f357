// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Result types for the decoding pipeline.
//!
//! [`Proposal`]s live in network space and are produced by the decoder. After suppression
//! they are mapped into [`Detection`]s in original-image space and collected into
//! [`Detections`], which mirrors the Ultralytics `Results` API for the detect task.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::Array2;

use crate::catalog::ClassCatalog;
use crate::utils::pluralize;

/// Timing information for inference operations (in milliseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
    /// Time spent on preprocessing.
    pub preprocess: Option<f64>,
    /// Time spent on model inference.
    pub inference: Option<f64>,
    /// Time spent on postprocessing.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings.
    ///
    /// # Arguments
    ///
    /// * `preprocess` - Time in milliseconds.
    /// * `inference` - Time in milliseconds.
    /// * `postprocess` - Time in milliseconds.
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess: Some(preprocess),
            inference: Some(inference),
            postprocess: Some(postprocess),
        }
    }

    /// Get total time.
    ///
    /// # Returns
    ///
    /// * Sum of preprocess, inference, and postprocess times in milliseconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

/// Axis-aligned box stored as top-left corner plus extent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width, never negative once built from corners.
    pub width: f32,
    /// Height, never negative once built from corners.
    pub height: f32,
}

impl BoundingBox {
    /// Create a box from its top-left corner and extent.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a box from corners. Inverted corners give zero extent.
    #[must_use]
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }

    /// Create a box from its center and extent.
    #[must_use]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: width.mul_add(-0.5, cx),
            y: height.mul_add(-0.5, cy),
            width,
            height,
        }
    }

    /// Right edge.
    #[must_use]
    pub fn x1(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn y1(&self) -> f32 {
        self.y + self.height
    }

    /// Area; zero for degenerate boxes.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Corners as `[x1, y1, x2, y2]`.
    #[must_use]
    pub fn xyxy(&self) -> [f32; 4] {
        [self.x, self.y, self.x1(), self.y1()]
    }

    /// Whether every coordinate is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// A candidate detection in network space, before suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
    /// Box in network pixels.
    pub bbox: BoundingBox,
    /// Index into the class catalog.
    pub class_id: usize,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// A final detection in original-image space, clipped to the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Box in original-image pixels.
    pub bbox: BoundingBox,
    /// Index into the class catalog.
    pub class_id: usize,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Detections for one frame.
#[derive(Debug, Clone)]
pub struct Detections {
    /// Detections in descending confidence order.
    pub detections: Vec<Detection>,
    /// Original image shape (height, width).
    pub orig_shape: (u32, u32),
    /// Network input shape (height, width) after letterboxing.
    pub inference_shape: (u32, u32),
    /// Inference timing information.
    pub speed: Speed,
    /// Class labels.
    pub catalog: Arc<ClassCatalog>,
}

impl Detections {
    /// Create a new container.
    #[must_use]
    pub const fn new(
        detections: Vec<Detection>,
        orig_shape: (u32, u32),
        inference_shape: (u32, u32),
        catalog: Arc<ClassCatalog>,
    ) -> Self {
        Self {
            detections,
            orig_shape,
            inference_shape,
            speed: Speed {
                preprocess: None,
                inference: None,
                postprocess: None,
            },
            catalog,
        }
    }

    /// Number of detections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Whether nothing was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Iterate over detections in descending confidence order.
    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// Label of a detection, or its class id when the catalog has no entry.
    #[must_use]
    pub fn label(&self, detection: &Detection) -> String {
        self.catalog
            .get(detection.class_id)
            .map_or_else(|| detection.class_id.to_string(), str::to_string)
    }

    /// Detections as an `N x 6` array of `[x1, y1, x2, y2, conf, cls]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_array(&self) -> Array2<f32> {
        let mut data = Array2::zeros((self.len(), 6));
        for (mut row, det) in data.rows_mut().into_iter().zip(&self.detections) {
            let [x1, y1, x2, y2] = det.bbox.xyxy();
            row[0] = x1;
            row[1] = y1;
            row[2] = x2;
            row[3] = y2;
            row[4] = det.confidence;
            row[5] = det.class_id as f32;
        }
        data
    }

    /// Per-class count summary, e.g. `"2 persons, 1 car, "`.
    #[must_use]
    pub fn verbose(&self) -> String {
        if self.is_empty() {
            return "(no detections), ".to_string();
        }

        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for det in &self.detections {
            *counts.entry(det.class_id).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(class_id, count)| {
                let name = self
                    .catalog
                    .get(class_id)
                    .map_or_else(|| class_id.to_string(), str::to_string);
                if count > 1 {
                    format!("{count} {}, ", pluralize(&name))
                } else {
                    format!("{count} {name}, ")
                }
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Detections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
