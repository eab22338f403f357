// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface: argument parsing, console output and the subcommands.

pub mod args;
pub mod decode;
pub mod geometry;
pub mod logging;

/// Model prediction over images.
#[cfg(feature = "onnx")]
pub mod predict;
