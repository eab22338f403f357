// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing of raw detection head output.
//!
//! The pipeline is `decode -> sort -> NMS -> map`. [`decode`] turns every output row into
//! at most one [`Proposal`] in network space, [`sort_proposals`] orders them by descending
//! confidence, [`nms_sorted`] keeps the survivors, and [`map_to_original`] undoes the
//! letterbox. [`postprocess`] runs all four steps.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use ndarray::{ArrayView1, ArrayView2, s};

use crate::error::{InferenceError, Result};
use crate::grid::GridPoint;
use crate::inference::InferenceConfig;
use crate::preprocessing::LetterboxTransform;
use crate::results::{BoundingBox, Detection, Proposal};
use crate::style::{DecodeStyle, ExpMode};
use crate::utils::nms_sorted;

/// Raw output of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl OutputTensor {
    /// Wrap a flat buffer with its shape.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::OutputShape`] if the shape does not describe `data.len()`
    /// values.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected = shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if expected != Some(data.len()) {
            return Err(InferenceError::OutputShape(format!(
                "shape {shape:?} does not match {} values",
                data.len()
            )));
        }
        Ok(Self { data, shape })
    }

    /// Tensor shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat values in row-major order.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// View the tensor as `(anchors, row_width)`.
    ///
    /// Accepts `(anchors, row_width)` or the channel-major `(row_width, anchors)`, each with
    /// an optional leading batch dimension of 1. Row-major wins when both axes match.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::OutputShape`] if neither axis equals `row_width` or the
    /// batch is larger than one.
    pub fn rows(&self, row_width: usize) -> Result<ArrayView2<'_, f32>> {
        let (a, b) = match *self.shape.as_slice() {
            [a, b] | [1, a, b] => (a, b),
            _ => {
                return Err(InferenceError::OutputShape(format!(
                    "expected (anchors, {row_width}) or ({row_width}, anchors) with an optional \
                     batch of 1, got {:?}",
                    self.shape
                )));
            }
        };

        let view = ArrayView2::from_shape((a, b), self.data.as_slice())
            .map_err(|e| InferenceError::OutputShape(e.to_string()))?;

        if b == row_width {
            Ok(view)
        } else if a == row_width {
            Ok(view.reversed_axes())
        } else {
            Err(InferenceError::OutputShape(format!(
                "no axis of {:?} matches the expected row width {row_width}",
                self.shape
            )))
        }
    }
}

// ================================================================================================
// Math
// ================================================================================================

/// Approximate `e^x` with relative error below 0.1% over the clamped range.
///
/// The input is clamped to `[-87, 88]`, split as `x * log2(e) = n + f` with `f` in `[0, 1)`,
/// `2^f` is evaluated with a degree-4 polynomial and `2^n` is assembled directly from the
/// exponent bits. NaN is passed through.
#[must_use]
pub fn fast_exp(x: f32) -> f32 {
    if x.is_nan() {
        return x;
    }
    let t = x.clamp(-87.0, 88.0) * std::f32::consts::LOG2_E;
    let n = t.floor();
    let f = t - n;

    let poly = f.mul_add(
        f.mul_add(f.mul_add(f.mul_add(0.009_618_13, 0.055_504_1), 0.240_227), 0.693_147),
        1.0,
    );
    let pow2n = f32::from_bits(((n as i32 + 127) as u32) << 23);
    pow2n * poly
}

/// Logistic sigmoid `1 / (1 + e^-x)`.
#[inline]
#[must_use]
pub fn sigmoid(x: f32, mode: ExpMode) -> f32 {
    1.0 / (1.0 + mode.exp(-x))
}

/// Expected bin index of a softmax distribution over `bins`.
///
/// The maximum is subtracted before exponentiating so large logits cannot overflow.
#[must_use]
pub fn dfl_expectation(bins: ArrayView1<'_, f32>, mode: ExpMode) -> f32 {
    let max = bins.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let (mut weighted, mut total) = (0.0f32, 0.0f32);
    for (i, &v) in bins.iter().enumerate() {
        let e = mode.exp(v - max);
        weighted = (i as f32).mul_add(e, weighted);
        total += e;
    }
    weighted / total
}

/// First index of the maximum value, or `None` if a value is not finite.
fn finite_argmax(values: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            return None;
        }
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best
}

// ================================================================================================
// Decode
// ================================================================================================

/// Decode every output row into proposals, in grid order.
///
/// Direct rows are `cx, cy, w, h, scores...` and keep scores strictly above the threshold.
/// DFL rows are four `reg_max`-bin side distributions followed by class logits; they keep
/// `sigmoid(max logit)` at or above the threshold and regress the box from the row's
/// grid anchor. Rows holding NaN or infinite values produce no proposal.
///
/// # Errors
///
/// Returns [`InferenceError::OutputShape`] when the tensor does not have the row width of
/// `config.style` with `num_classes` classes, or when a grid-relative head has a different
/// number of rows than `grid`.
pub fn decode(
    output: &OutputTensor,
    grid: &[GridPoint],
    num_classes: usize,
    config: &InferenceConfig,
) -> Result<Vec<Proposal>> {
    let row_width = config.style.row_width(num_classes);
    let rows = output.rows(row_width)?;

    if config.style.needs_grid() && rows.nrows() != grid.len() {
        return Err(InferenceError::OutputShape(format!(
            "output has {} rows but the anchor grid has {} points",
            rows.nrows(),
            grid.len()
        )));
    }

    let proposals = match config.style {
        DecodeStyle::Direct => decode_direct(rows, config.prob_threshold),
        DecodeStyle::Dfl { reg_max } => decode_dfl(
            rows,
            grid,
            reg_max,
            config.prob_threshold,
            config.exp_mode,
        ),
    };

    tracing::debug!(
        style = %config.style,
        rows = rows.nrows(),
        proposals = proposals.len(),
        "decoded output"
    );
    Ok(proposals)
}

fn decode_direct(rows: ArrayView2<'_, f32>, threshold: f32) -> Vec<Proposal> {
    let mut proposals = Vec::new();
    let mut non_finite = 0usize;

    for row in rows.rows() {
        let Some((class_id, score)) = finite_argmax(row.slice(s![4..])) else {
            non_finite += 1;
            continue;
        };
        if score <= threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let bbox = BoundingBox::from_corners(
            w.mul_add(-0.5, cx),
            h.mul_add(-0.5, cy),
            w.mul_add(0.5, cx),
            h.mul_add(0.5, cy),
        );
        if !bbox.is_finite() {
            non_finite += 1;
            continue;
        }

        proposals.push(Proposal {
            bbox,
            class_id,
            confidence: score.clamp(0.0, 1.0),
        });
    }

    if non_finite > 0 {
        tracing::warn!(rows = non_finite, "skipped output rows with non-finite values");
    }
    proposals
}

fn decode_dfl(
    rows: ArrayView2<'_, f32>,
    grid: &[GridPoint],
    reg_max: usize,
    threshold: f32,
    mode: ExpMode,
) -> Vec<Proposal> {
    let mut proposals = Vec::new();
    let mut non_finite = 0usize;

    for (row, point) in rows.rows().into_iter().zip(grid) {
        let Some((class_id, logit)) = finite_argmax(row.slice(s![4 * reg_max..])) else {
            non_finite += 1;
            continue;
        };
        let confidence = sigmoid(logit, mode);
        if confidence < threshold {
            continue;
        }

        let stride = point.stride as f32;
        let mut dist = [0.0f32; 4];
        for (side, d) in dist.iter_mut().enumerate() {
            *d = dfl_expectation(row.slice(s![side * reg_max..(side + 1) * reg_max]), mode)
                * stride;
        }

        let (cx, cy) = point.center();
        let bbox =
            BoundingBox::from_corners(cx - dist[0], cy - dist[1], cx + dist[2], cy + dist[3]);
        if !bbox.is_finite() {
            non_finite += 1;
            continue;
        }

        proposals.push(Proposal {
            bbox,
            class_id,
            confidence,
        });
    }

    if non_finite > 0 {
        tracing::warn!(rows = non_finite, "skipped output rows with non-finite values");
    }
    proposals
}

// ================================================================================================
// Sort, suppress, map
// ================================================================================================

/// Sort proposals by descending confidence. Ties keep no particular order.
pub fn sort_proposals(proposals: &mut [Proposal]) {
    proposals.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

/// Map the kept proposals into original-image space, clipped to the image.
#[must_use]
pub fn map_to_original(
    proposals: &[Proposal],
    keep: &[usize],
    transform: &LetterboxTransform,
) -> Vec<Detection> {
    keep.iter()
        .map(|&i| {
            let p = &proposals[i];
            Detection {
                bbox: transform.map_box(&p.bbox),
                class_id: p.class_id,
                confidence: p.confidence,
            }
        })
        .collect()
}

/// Run decode, sort, NMS and coordinate mapping on one output tensor.
///
/// An empty result is not an error.
///
/// # Errors
///
/// See [`decode`].
pub fn postprocess(
    output: &OutputTensor,
    grid: &[GridPoint],
    num_classes: usize,
    transform: &LetterboxTransform,
    config: &InferenceConfig,
) -> Result<Vec<Detection>> {
    let mut proposals = decode(output, grid, num_classes, config)?;
    sort_proposals(&mut proposals);
    let keep = nms_sorted(
        &proposals,
        config.nms_threshold,
        config.agnostic_nms,
        config.max_detections,
    );
    tracing::debug!(
        candidates = proposals.len(),
        kept = keep.len(),
        "non-maximum suppression"
    );
    Ok(map_to_original(&proposals, &keep, transform))
}
