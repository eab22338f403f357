// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the decoding pipeline.
//!
//! Errors fall into three groups. Per-frame failures (`InvalidImage`, `InferenceFailure`,
//! `OutputShape`) fail one call and leave the [`Detector`](crate::Detector) usable.
//! Initialization failures (`CatalogMismatch`, `ConfigError`) are reported once, and a
//! detector that hit one refuses further calls with `NotInitialized`. The rest are loading
//! errors from files and images.

use std::fmt;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Main error type for the pipeline.
#[derive(Debug)]
pub enum InferenceError {
    /// Input image has zero dimensions, an unsupported layout, or a short buffer.
    InvalidImage(String),
    /// The inference engine reported an error.
    InferenceFailure(String),
    /// The output tensor does not match the configured decode layout.
    OutputShape(String),
    /// The model's class count and the label catalog disagree.
    CatalogMismatch {
        /// Number of classes in the catalog.
        expected: usize,
        /// Number of classes the model produces.
        found: usize,
    },
    /// Invalid configuration provided.
    ConfigError(String),
    /// The detector was never initialized, failed initialization, or was released.
    NotInitialized,
    /// Error loading a model file.
    ModelLoadError(String),
    /// Error parsing a model descriptor.
    MetadataError(String),
    /// Error decoding or reading an image file.
    ImageError(String),
    /// Wrapped `std::io::Error`.
    Io(std::io::Error),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidImage(msg) => write!(f, "Invalid image: {msg}"),
            Self::InferenceFailure(msg) => write!(f, "Inference failure: {msg}"),
            Self::OutputShape(msg) => write!(f, "Output shape error: {msg}"),
            Self::CatalogMismatch { expected, found } => write!(
                f,
                "Catalog mismatch: label file has {expected} classes but the model outputs {found}"
            ),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::NotInitialized => write!(f, "Detector is not initialized"),
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::MetadataError(msg) => write!(f, "Metadata error: {msg}"),
            Self::ImageError(msg) => write!(f, "Image error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for InferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl InferenceError {
    /// Whether this error comes from initialization and blocks the detector until it is
    /// rebuilt.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CatalogMismatch { .. } | Self::ConfigError(_) | Self::NotInitialized
        )
    }
}

impl From<std::io::Error> for InferenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
