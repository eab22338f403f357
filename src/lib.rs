// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # YOLO Decode
//!
//! Letterbox preprocessing and output decoding for anchor-free YOLO detectors.
//!
//! The crate turns an image plus the raw output tensor of a detection network into a
//! small set of labeled, scored boxes in the coordinate space of the *original* image:
//!
//! ```text
//! ImageView -> letterbox -> (tensor, LetterboxTransform) -> [InferenceEngine] -> OutputTensor
//!           -> decode (grid) -> sort -> per-class NMS -> inverse letterbox -> Detections
//! ```
//!
//! ## Features
//!
//! - **Letterbox** - Uniform scale, symmetric 114-gray padding, fixed or stride-aligned input
//! - **Two Heads** - Direct `cx, cy, w, h, scores` rows and DFL rows with per-side softmax
//! - **Per-class NMS** - Greedy suppression against kept boxes of the same class
//! - **Exact Inverse** - Boxes mapped back and clipped to the last pixel of the source
//! - **Pluggable Engine** - Any closure is an engine; ONNX Runtime behind the `onnx` feature
//!
//! ## Quick Start (Library)
//!
//! ```
//! use yolo_decode::{
//!     ChannelOrder, ClassCatalog, DecodeStyle, Detector, ImageView, InferenceConfig,
//!     OutputTensor,
//! };
//! use ndarray::Array4;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Replace the closure with a real engine (for example `OrtEngine`).
//! let engine = |_: &Array4<f32>| OutputTensor::new(vec![-10.0; 2100 * 66], vec![1, 2100, 66]);
//! let config = InferenceConfig::for_style(DecodeStyle::dfl())
//!     .with_size_policy(yolo_decode::SizePolicy::Fixed { size: 320 });
//! let mut detector = Detector::new(engine, ClassCatalog::from_text("cat\ndog\n"), config)?;
//!
//! let pixels = vec![127u8; 640 * 480 * 3];
//! let image = ImageView::packed(&pixels, 640, 480, ChannelOrder::Rgb)?;
//! let detections = detector.detect(&image)?;
//! for det in &detections {
//!     println!("{} {:.2} {:?}", detections.label(det), det.confidence, det.bbox);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Decode a raw little-endian f32 output tensor recorded for an image
//! yolo-decode decode --image frame.jpg --output head.bin --shape 1,2100,66 \
//!     --labels labels.txt --style dfl --imgsz 320
//!
//! # Print the letterbox geometry for an image size
//! yolo-decode geometry --width 1280 --height 720 --imgsz 640
//!
//! # Run an ONNX model end to end (requires the `onnx` feature)
//! yolo-decode predict --model model.onnx --source image.jpg --labels labels.txt
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`model`] | [`Detector`] lifecycle and per-frame pipeline |
//! | [`preprocessing`] | [`ImageView`], [`LetterboxTransform`] and tensor construction |
//! | [`grid`] | Anchor grid generation and [`GridCache`] |
//! | [`postprocessing`] | [`OutputTensor`], decode, sort, NMS and coordinate mapping |
//! | [`results`] | [`Proposal`], [`Detection`], [`Detections`] |
//! | [`style`] | [`DecodeStyle`] and [`ExpMode`] |
//! | [`inference`] | [`InferenceConfig`] |
//! | [`catalog`] | [`ClassCatalog`] label files |
//! | [`metadata`] | [`ModelDescriptor`] parsing |
//! | [`engine`] | [`InferenceEngine`] boundary |
//! | [`error`] | Error types ([`InferenceError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `onnx` | `OrtEngine` and the `predict` CLI command via ONNX Runtime |

// Modules
pub mod catalog;
pub mod engine;
pub mod error;
pub mod grid;
pub mod inference;
pub mod metadata;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod results;
pub mod style;
pub mod utils;

// Re-export main types for convenience
pub use catalog::ClassCatalog;
#[cfg(feature = "onnx")]
pub use engine::OrtEngine;
pub use engine::InferenceEngine;
pub use error::{InferenceError, Result};
pub use grid::{GridCache, GridPoint, generate_grid};
pub use inference::InferenceConfig;
pub use metadata::ModelDescriptor;
pub use model::Detector;
pub use postprocessing::{OutputTensor, decode, postprocess};
pub use preprocessing::{
    ChannelOrder, ImageView, LetterboxTransform, PreprocessResult, SizePolicy, TensorOrder,
    preprocess_image,
};
pub use results::{BoundingBox, Detection, Detections, Proposal, Speed};
pub use style::{DecodeStyle, ExpMode};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
