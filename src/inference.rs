// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pipeline configuration.
//!
//! This module defines [`InferenceConfig`], which controls the confidence and NMS
//! thresholds, the letterbox size policy, the output head layout and the anchor strides.

use crate::error::{InferenceError, Result};
use crate::preprocessing::{SizePolicy, TensorOrder};
use crate::style::{DecodeStyle, ExpMode};

/// Anchor strides of the three detection levels, finest first.
pub const DEFAULT_STRIDES: [u32; 3] = [8, 16, 32];

/// Configuration for one detection pipeline.
///
/// Uses a builder pattern for convenient construction.
///
/// # Example
///
/// ```rust
/// use yolo_decode::{DecodeStyle, InferenceConfig, SizePolicy};
///
/// let config = InferenceConfig::for_style(DecodeStyle::dfl())
///     .with_iou(0.5)
///     .with_size_policy(SizePolicy::StrideAligned { size: 320, stride: 32 })
///     .with_max_detections(100);
/// assert!((config.prob_threshold - 0.4).abs() < f32::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// Confidence threshold (0.0 to 1.0).
    /// Direct heads keep scores strictly above it, DFL heads keep sigmoid scores at or
    /// above it.
    pub prob_threshold: f32,
    /// `IoU` threshold for per-class Non-Maximum Suppression (0.0 to 1.0).
    /// A candidate is dropped when its `IoU` with a kept box is strictly greater.
    pub nms_threshold: f32,
    /// How the network input size is chosen.
    pub size_policy: SizePolicy,
    /// Output head layout.
    pub style: DecodeStyle,
    /// Anchor strides, finest level first. Only used by grid-relative heads.
    pub strides: Vec<u32>,
    /// Maximum number of detections kept after NMS.
    pub max_detections: usize,
    /// Suppress overlapping boxes across classes as well.
    pub agnostic_nms: bool,
    /// Exponential used by sigmoid and softmax.
    pub exp_mode: ExpMode,
    /// Channel order of the produced tensor.
    pub tensor_order: TensorOrder,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            prob_threshold: DecodeStyle::Direct.default_threshold(),
            nms_threshold: 0.45,
            size_policy: SizePolicy::default(),
            style: DecodeStyle::Direct,
            strides: DEFAULT_STRIDES.to_vec(),
            max_detections: 300,
            agnostic_nms: false,
            exp_mode: ExpMode::Exact,
            tensor_order: TensorOrder::Rgb,
        }
    }
}

impl InferenceConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for `style` with its paired confidence threshold.
    #[must_use]
    pub fn for_style(style: DecodeStyle) -> Self {
        Self {
            prob_threshold: style.default_threshold(),
            style,
            ..Self::default()
        }
    }

    /// Set the confidence threshold.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.prob_threshold = threshold;
        self
    }

    /// Set the `IoU` threshold for Non-Maximum Suppression.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.nms_threshold = threshold;
        self
    }

    /// Set the letterbox size policy.
    #[must_use]
    pub const fn with_size_policy(mut self, policy: SizePolicy) -> Self {
        self.size_policy = policy;
        self
    }

    /// Set the output head layout. The confidence threshold is left unchanged.
    #[must_use]
    pub const fn with_style(mut self, style: DecodeStyle) -> Self {
        self.style = style;
        self
    }

    /// Set the anchor strides, finest level first.
    #[must_use]
    pub fn with_strides(mut self, strides: impl Into<Vec<u32>>) -> Self {
        self.strides = strides.into();
        self
    }

    /// Set the maximum number of detections to return.
    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Enable or disable class-agnostic suppression.
    #[must_use]
    pub const fn with_agnostic_nms(mut self, agnostic: bool) -> Self {
        self.agnostic_nms = agnostic;
        self
    }

    /// Select the exponential used by sigmoid and softmax.
    #[must_use]
    pub const fn with_exp_mode(mut self, mode: ExpMode) -> Self {
        self.exp_mode = mode;
        self
    }

    /// Set the channel order of the produced tensor.
    #[must_use]
    pub const fn with_tensor_order(mut self, order: TensorOrder) -> Self {
        self.tensor_order = order;
        self
    }

    /// Check that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] for thresholds outside `[0, 1]`, an empty
    /// or zero stride list on a grid-relative head, zero DFL bins, or a zero input size.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.prob_threshold) {
            return Err(InferenceError::ConfigError(format!(
                "prob_threshold must be in [0, 1], got {}",
                self.prob_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(InferenceError::ConfigError(format!(
                "nms_threshold must be in [0, 1], got {}",
                self.nms_threshold
            )));
        }
        if let DecodeStyle::Dfl { reg_max: 0 } = self.style {
            return Err(InferenceError::ConfigError(
                "DFL head needs at least one bin per side".to_string(),
            ));
        }
        if self.style.needs_grid() && (self.strides.is_empty() || self.strides.contains(&0)) {
            return Err(InferenceError::ConfigError(format!(
                "strides must be non-empty and positive, got {:?}",
                self.strides
            )));
        }
        self.size_policy.validate()
    }
}
