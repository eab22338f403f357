// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference engine boundary.
//!
//! The pipeline never runs a network itself. It hands a letterboxed `(1, 3, H, W)` tensor
//! to an [`InferenceEngine`] and decodes whatever [`OutputTensor`] comes back. Any
//! `FnMut(&Array4<f32>) -> Result<OutputTensor>` closure is an engine, which is how tests
//! and replayed tensors plug in. [`OrtEngine`] runs ONNX models when the `onnx` feature is
//! enabled.

use ndarray::Array4;

use crate::error::Result;
use crate::postprocessing::OutputTensor;

/// Something that maps an input tensor to a raw detection head output.
pub trait InferenceEngine {
    /// Run one forward pass.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures as
    /// [`InferenceError::InferenceFailure`](crate::InferenceError::InferenceFailure).
    fn run(&mut self, input: &Array4<f32>) -> Result<OutputTensor>;
}

impl<F> InferenceEngine for F
where
    F: FnMut(&Array4<f32>) -> Result<OutputTensor>,
{
    fn run(&mut self, input: &Array4<f32>) -> Result<OutputTensor> {
        self(input)
    }
}

#[cfg(feature = "onnx")]
pub use ort_engine::OrtEngine;

#[cfg(feature = "onnx")]
mod ort_engine {
    use std::collections::HashMap;
    use std::path::Path;

    use ndarray::Array4;
    use ort::session::Session;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::value::TensorRef;

    use super::InferenceEngine;
    use crate::error::{InferenceError, Result};
    use crate::metadata::ModelDescriptor;
    use crate::postprocessing::OutputTensor;

    /// ONNX Runtime session wrapped as an [`InferenceEngine`].
    pub struct OrtEngine {
        session: Session,
        input_name: String,
        output_name: String,
        descriptor: Option<ModelDescriptor>,
    }

    impl OrtEngine {
        /// Load an ONNX model.
        ///
        /// `num_threads` sets the intra-op thread count (0 lets ONNX Runtime choose).
        ///
        /// # Errors
        ///
        /// Returns [`InferenceError::ModelLoadError`] if the file is missing or the session
        /// cannot be built.
        pub fn load<P: AsRef<Path>>(path: P, num_threads: usize) -> Result<Self> {
            let path = path.as_ref();
            if !path.exists() {
                return Err(InferenceError::ModelLoadError(format!(
                    "Model file not found: {}",
                    path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to create session builder: {e}"))
                })?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to set optimization level: {e}"))
                })?
                .with_intra_threads(num_threads)
                .map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
                })?
                .commit_from_file(path)
                .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;

            let input_name = session
                .inputs
                .first()
                .map_or_else(|| "images".to_string(), |i| i.name.clone());
            let output_name = session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| InferenceError::ModelLoadError("Model has no outputs".to_string()))?;

            let descriptor = Self::read_descriptor(&session);
            tracing::debug!(
                model = %path.display(),
                input = %input_name,
                output = %output_name,
                has_descriptor = descriptor.is_some(),
                "loaded ONNX model"
            );

            Ok(Self {
                session,
                input_name,
                output_name,
                descriptor,
            })
        }

        /// Descriptor embedded in the model's custom metadata, if any.
        #[must_use]
        pub const fn descriptor(&self) -> Option<&ModelDescriptor> {
            self.descriptor.as_ref()
        }

        fn read_descriptor(session: &Session) -> Option<ModelDescriptor> {
            let metadata = session.metadata().ok()?;
            let keys = [
                "description", "version", "style", "reg_max", "strides", "stride", "imgsz",
                "names",
            ];

            let lines: Vec<String> = keys
                .iter()
                .filter_map(|key| match metadata.custom(key) {
                    Ok(Some(value)) => Some(format!("{key}: {value}")),
                    _ => None,
                })
                .collect();
            if lines.is_empty() {
                return None;
            }

            let map = HashMap::from([("metadata".to_string(), lines.join("\n"))]);
            match ModelDescriptor::from_onnx_metadata(&map) {
                Ok(descriptor) => Some(descriptor),
                Err(err) => {
                    tracing::warn!(%err, "ignoring malformed model metadata");
                    None
                }
            }
        }
    }

    impl InferenceEngine for OrtEngine {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        fn run(&mut self, input: &Array4<f32>) -> Result<OutputTensor> {
            let input = input.as_standard_layout();
            let tensor = TensorRef::from_array_view(&input).map_err(|e| {
                InferenceError::InferenceFailure(format!("Failed to create input tensor: {e}"))
            })?;

            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| InferenceError::InferenceFailure(format!("Inference failed: {e}")))?;

            let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
                InferenceError::InferenceFailure(format!("Output '{}' not found", self.output_name))
            })?;

            let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
                InferenceError::InferenceFailure(format!("Failed to extract output: {e}"))
            })?;

            let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            OutputTensor::new(data.to_vec(), shape)
        }
    }

    impl std::fmt::Debug for OrtEngine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OrtEngine")
                .field("input", &self.input_name)
                .field("output", &self.output_name)
                .field("descriptor", &self.descriptor)
                .finish_non_exhaustive()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_model_not_found() {
            let result = OrtEngine::load("nonexistent.onnx", 0);
            assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;

    #[test]
    fn test_closure_engine() {
        let mut calls = 0;
        let mut engine = |input: &Array4<f32>| {
            calls += 1;
            OutputTensor::new(vec![input.sum(); 2], vec![1, 2])
        };
        let input = Array4::<f32>::ones((1, 3, 2, 2));
        let output = engine.run(&input).unwrap();
        assert_eq!(output.shape(), &[1, 2]);
        assert!((output.data()[0] - 12.0).abs() < f32::EPSILON);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_closure_engine_failure() {
        let mut engine = |_: &Array4<f32>| -> Result<OutputTensor> {
            Err(InferenceError::InferenceFailure("device lost".to_string()))
        };
        let err = engine.run(&Array4::zeros((1, 3, 1, 1))).unwrap_err();
        assert!(matches!(err, InferenceError::InferenceFailure(_)));
    }
}
