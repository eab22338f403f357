// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detector lifecycle and per-frame pipeline.
//!
//! This module provides [`Detector`], which owns an inference engine, the class catalog,
//! the configuration and the anchor grid cache, and runs
//! `preprocess -> inference -> decode -> sort -> NMS -> map` for each frame.

use std::sync::Arc;
use std::time::Instant;

use ndarray::Array4;

use crate::catalog::ClassCatalog;
use crate::engine::InferenceEngine;
use crate::error::{InferenceError, Result};
use crate::grid::{GridCache, GridPoint, grid_len};
use crate::inference::InferenceConfig;
use crate::metadata::ModelDescriptor;
use crate::postprocessing::{OutputTensor, postprocess};
use crate::preprocessing::{ImageView, LetterboxTransform, preprocess_image};
use crate::results::{Detection, Detections, Speed};

/// Object detector wrapping an [`InferenceEngine`].
///
/// A detector is built once per model. Construction validates the configuration, and the
/// first call (or an explicit [`warmup`](Self::warmup)) checks that the model's class count
/// matches the catalog. A detector that fails that check, or that was
/// [`release`](Self::release)d, answers every call with [`InferenceError::NotInitialized`];
/// build a new one to recover.
///
/// # Example
///
/// ```
/// use yolo_decode::{ClassCatalog, Detector, ImageView, ChannelOrder, InferenceConfig, OutputTensor};
/// use ndarray::Array4;
///
/// // An engine that finds nothing: 8400 anchors, 4 box values + 2 class scores.
/// let engine = |_: &Array4<f32>| OutputTensor::new(vec![0.0; 8400 * 6], vec![1, 6, 8400]);
/// let catalog = ClassCatalog::from_text("cat\ndog\n");
/// let mut detector = Detector::new(engine, catalog, InferenceConfig::default())?;
///
/// let pixels = vec![0u8; 64 * 48 * 3];
/// let image = ImageView::packed(&pixels, 64, 48, ChannelOrder::Rgb)?;
/// let detections = detector.detect(&image)?;
/// assert!(detections.is_empty());
/// # Ok::<(), yolo_decode::InferenceError>(())
/// ```
pub struct Detector<E> {
    /// Inference engine, `None` once released or after a failed layout check.
    engine: Option<E>,
    /// Class labels shared with every result.
    catalog: Arc<ClassCatalog>,
    /// Pipeline configuration.
    config: InferenceConfig,
    /// Anchor grids by network size.
    grids: GridCache,
    /// Whether the model layout has been checked.
    warmed_up: bool,
}

impl<E: InferenceEngine> Detector<E> {
    /// Create a detector.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] for an invalid configuration or an empty
    /// catalog.
    pub fn new(engine: E, catalog: ClassCatalog, config: InferenceConfig) -> Result<Self> {
        config.validate()?;
        if catalog.is_empty() {
            return Err(InferenceError::ConfigError(
                "class catalog has no labels".to_string(),
            ));
        }

        tracing::debug!(
            classes = catalog.len(),
            style = %config.style,
            "created detector"
        );

        Ok(Self {
            engine: Some(engine),
            catalog: Arc::new(catalog),
            config,
            grids: GridCache::default(),
            warmed_up: false,
        })
    }

    /// Create a detector whose layout comes from a model descriptor.
    ///
    /// Style, strides and input size are taken from `descriptor`; thresholds stay as in
    /// `config`. Without an explicit catalog the descriptor's `names` are used.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::CatalogMismatch`] if both the catalog and the descriptor
    /// name classes and their counts differ, plus the errors of [`Detector::new`].
    pub fn with_descriptor(
        engine: E,
        catalog: Option<ClassCatalog>,
        descriptor: &ModelDescriptor,
        config: InferenceConfig,
    ) -> Result<Self> {
        let catalog = match catalog {
            Some(catalog) => {
                let named = descriptor.num_classes();
                if named > 0 && named != catalog.len() {
                    return Err(InferenceError::CatalogMismatch {
                        expected: catalog.len(),
                        found: named,
                    });
                }
                catalog
            }
            None => descriptor.catalog(),
        };
        Self::new(engine, catalog, descriptor.apply_to(config))
    }

    /// Run the engine once on a blank input and check the output layout.
    ///
    /// Called automatically before the first detection. An engine failure is returned
    /// and the next call retries; a class count that disagrees with the catalog, or an
    /// output the configured style cannot decode, releases the engine.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::NotInitialized`] after a release, the engine's error if
    /// the run fails, or [`InferenceError::CatalogMismatch`] /
    /// [`InferenceError::OutputShape`] if the layout is wrong.
    pub fn warmup(&mut self) -> Result<()> {
        if self.warmed_up {
            return Ok(());
        }

        let size = self.config.size_policy.target_size();
        let transform = LetterboxTransform::compute(size, size, self.config.size_policy)?;
        let engine = self.engine.as_mut().ok_or(InferenceError::NotInitialized)?;

        let dummy = Array4::<f32>::zeros((
            1,
            3,
            transform.network_h as usize,
            transform.network_w as usize,
        ));
        let output = engine.run(&dummy)?;

        if let Err(err) = self.verify_layout(&output, &transform) {
            tracing::error!(%err, "model output does not match the configured layout");
            self.engine = None;
            return Err(err);
        }

        self.warmed_up = true;
        Ok(())
    }

    /// Detect objects in one frame.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidImage`] for an unusable image,
    /// [`InferenceError::NotInitialized`] after a release or failed warmup, and the
    /// engine's error or [`InferenceError::OutputShape`] when a frame cannot be decoded.
    /// None of the per-frame errors affect later calls.
    pub fn detect(&mut self, image: &ImageView<'_>) -> Result<Detections> {
        if !self.warmed_up {
            self.warmup()?;
        }
        let engine = self.engine.as_mut().ok_or(InferenceError::NotInitialized)?;

        let start_preprocess = Instant::now();
        let preprocessed =
            preprocess_image(image, self.config.size_policy, self.config.tensor_order)?;
        let preprocess_time = start_preprocess.elapsed().as_secs_f64() * 1000.0;

        let start_inference = Instant::now();
        let output = engine.run(&preprocessed.tensor)?;
        let inference_time = start_inference.elapsed().as_secs_f64() * 1000.0;

        let start_postprocess = Instant::now();
        let transform = preprocessed.transform;
        let detections = self.postprocess(&output, &transform)?;
        let postprocess_time = start_postprocess.elapsed().as_secs_f64() * 1000.0;

        let mut result = Detections::new(
            detections,
            (transform.orig_h, transform.orig_w),
            (transform.network_h, transform.network_w),
            Arc::clone(&self.catalog),
        );
        result.speed = Speed::new(preprocess_time, inference_time, postprocess_time);
        Ok(result)
    }

    /// Decode an output tensor produced for `transform` into final detections.
    ///
    /// Does not touch the engine, so it can be used on tensors produced elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::OutputShape`] if the tensor does not fit the layout.
    pub fn postprocess(
        &self,
        output: &OutputTensor,
        transform: &LetterboxTransform,
    ) -> Result<Vec<Detection>> {
        let grid = self.grid_for(transform);
        postprocess(output, &grid, self.catalog.len(), transform, &self.config)
    }

    /// Drop the engine. Later calls fail with [`InferenceError::NotInitialized`].
    pub fn release(&mut self) {
        if self.engine.take().is_some() {
            tracing::debug!("released inference engine");
        }
    }

    /// Whether the detector can still run inference.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Get the class catalog.
    #[must_use]
    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Get the pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &InferenceConfig {
        &self.config
    }

    fn grid_for(&self, transform: &LetterboxTransform) -> Arc<[GridPoint]> {
        if self.config.style.needs_grid() {
            self.grids
                .get_or_generate(transform.network_w, transform.network_h, &self.config.strides)
        } else {
            Arc::from(Vec::new())
        }
    }

    /// Class count carried by `output`, found from the axis that is not the anchor axis.
    fn classes_in_output(
        &self,
        output: &OutputTensor,
        transform: &LetterboxTransform,
    ) -> Option<usize> {
        let (a, b) = match *output.shape() {
            [a, b] | [1, a, b] => (a, b),
            _ => return None,
        };
        let anchors = grid_len(transform.network_w, transform.network_h, &self.config.strides);
        let width = if a == anchors {
            b
        } else if b == anchors {
            a
        } else {
            a.min(b)
        };
        self.config.style.classes_for_width(width)
    }

    fn verify_layout(&self, output: &OutputTensor, transform: &LetterboxTransform) -> Result<()> {
        let expected = self.catalog.len();
        match self.classes_in_output(output, transform) {
            Some(found) if found != expected => {
                return Err(InferenceError::CatalogMismatch { expected, found });
            }
            Some(_) => {}
            None => {
                return Err(InferenceError::OutputShape(format!(
                    "cannot read a {} layout from output shape {:?}",
                    self.config.style,
                    output.shape()
                )));
            }
        }
        self.postprocess(output, transform).map(|_| ())
    }
}

impl<E> std::fmt::Debug for Detector<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("initialized", &self.engine.is_some())
            .field("num_classes", &self.catalog.len())
            .field("config", &self.config)
            .field("warmed_up", &self.warmed_up)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::DecodeStyle;

    fn empty_direct(anchors: usize, classes: usize) -> OutputTensor {
        OutputTensor::new(vec![0.0; anchors * (4 + classes)], vec![1, 4 + classes, anchors])
            .unwrap()
    }

    fn catalog(n: usize) -> ClassCatalog {
        ClassCatalog::from_labels((0..n).map(|i| format!("class{i}")))
    }

    #[test]
    fn test_rejects_invalid_config() {
        let engine = |_: &Array4<f32>| -> Result<OutputTensor> { Ok(empty_direct(8400, 2)) };
        let err = Detector::new(engine, catalog(2), InferenceConfig::new().with_iou(2.0))
            .unwrap_err();
        assert!(matches!(err, InferenceError::ConfigError(_)));

        let err = Detector::new(engine, ClassCatalog::default(), InferenceConfig::new())
            .unwrap_err();
        assert!(matches!(err, InferenceError::ConfigError(_)));
    }

    #[test]
    fn test_catalog_mismatch_blocks_detector() {
        let engine = |_: &Array4<f32>| -> Result<OutputTensor> { Ok(empty_direct(8400, 80)) };
        let mut detector = Detector::new(engine, catalog(3), InferenceConfig::new()).unwrap();

        let err = detector.warmup().unwrap_err();
        assert!(matches!(
            err,
            InferenceError::CatalogMismatch {
                expected: 3,
                found: 80
            }
        ));
        assert!(!detector.is_initialized());

        let pixels = vec![0u8; 12];
        let image = ImageView::packed(&pixels, 2, 2, crate::ChannelOrder::Rgb).unwrap();
        assert!(matches!(
            detector.detect(&image),
            Err(InferenceError::NotInitialized)
        ));
    }

    #[test]
    fn test_engine_failure_is_not_fatal() {
        let mut fail = true;
        let engine = move |_: &Array4<f32>| -> Result<OutputTensor> {
            if fail {
                fail = false;
                Err(InferenceError::InferenceFailure("busy".to_string()))
            } else {
                Ok(empty_direct(8400, 2))
            }
        };
        let mut detector = Detector::new(engine, catalog(2), InferenceConfig::new()).unwrap();
        assert!(matches!(
            detector.warmup(),
            Err(InferenceError::InferenceFailure(_))
        ));
        assert!(detector.is_initialized());
        assert!(detector.warmup().is_ok());
    }

    #[test]
    fn test_release() {
        let engine = |_: &Array4<f32>| -> Result<OutputTensor> { Ok(empty_direct(8400, 2)) };
        let mut detector = Detector::new(engine, catalog(2), InferenceConfig::new()).unwrap();
        assert!(detector.warmup().is_ok());
        detector.release();
        assert!(!detector.is_initialized());

        let pixels = vec![0u8; 12];
        let image = ImageView::packed(&pixels, 2, 2, crate::ChannelOrder::Rgb).unwrap();
        assert!(matches!(
            detector.detect(&image),
            Err(InferenceError::NotInitialized)
        ));
    }

    #[test]
    fn test_dfl_layout_check() {
        // 320 square input: 40*40 + 20*20 + 10*10 anchors, 4*16 + 2 values per row.
        let anchors = 2100;
        let engine =
            move |_: &Array4<f32>| OutputTensor::new(vec![-5.0; anchors * 66], vec![anchors, 66]);
        let config = InferenceConfig::for_style(DecodeStyle::dfl())
            .with_size_policy(crate::SizePolicy::Fixed { size: 320 });
        let mut detector = Detector::new(engine, catalog(2), config).unwrap();
        assert!(detector.warmup().is_ok());
    }

    #[test]
    fn test_with_descriptor_mismatch() {
        let engine = |_: &Array4<f32>| -> Result<OutputTensor> { Ok(empty_direct(8400, 2)) };
        let descriptor =
            ModelDescriptor::from_yaml_str("names:\n  0: a\n  1: b\n  2: c\n").unwrap();
        let err = Detector::with_descriptor(
            engine,
            Some(catalog(2)),
            &descriptor,
            InferenceConfig::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            InferenceError::CatalogMismatch {
                expected: 2,
                found: 3
            }
        ));

        let detector =
            Detector::with_descriptor(engine, None, &descriptor, InferenceConfig::new()).unwrap();
        assert_eq!(detector.catalog().len(), 3);
    }
}
