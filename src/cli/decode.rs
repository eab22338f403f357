// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array4;
use yolo_decode::{
    ClassCatalog, Detections, Detector, InferenceError, LetterboxTransform, ModelDescriptor,
    OutputTensor, Result, Speed,
};

use crate::cli::args::DecodeArgs;
use crate::{section, success, verbose};

/// Decode a recorded output tensor against the image it was produced for.
///
/// # Errors
///
/// Returns an error if an input file cannot be read or the tensor does not fit the layout.
pub fn run_decode(args: &DecodeArgs) -> Result<()> {
    let descriptor = args
        .pipeline
        .descriptor
        .as_ref()
        .map(ModelDescriptor::load)
        .transpose()?;
    let config = args.pipeline.to_config(descriptor.as_ref());
    let catalog = load_catalog(args.labels.as_deref(), descriptor.as_ref())?;

    let (orig_w, orig_h) = image::image_dimensions(&args.image)?;
    let transform = LetterboxTransform::compute(orig_w, orig_h, config.size_policy)?;

    let output = OutputTensor::new(read_f32_le(&args.output)?, args.shape.clone())?;
    verbose!(
        "{}: {}x{} -> {}x{}, scale {:.4}, pad ({:.1}, {:.1}), output {:?}, style {}",
        args.image.display(),
        orig_w,
        orig_h,
        transform.network_w,
        transform.network_h,
        transform.scale,
        transform.pad_x,
        transform.pad_y,
        output.shape(),
        config.style
    );

    // Only `postprocess` is used, so the engine is never run.
    let replay = |_: &Array4<f32>| -> Result<OutputTensor> {
        Err(InferenceError::InferenceFailure(
            "decode replays a recorded tensor".to_string(),
        ))
    };
    let detector = Detector::new(replay, catalog, config)?;

    let start = Instant::now();
    let detections = detector.postprocess(&output, &transform)?;
    let elapsed = start.elapsed().as_secs_f64() * 1000.0;

    let mut result = Detections::new(
        detections,
        (transform.orig_h, transform.orig_w),
        (transform.network_h, transform.network_w),
        Arc::new(detector.catalog().clone()),
    );
    result.speed = Speed::new(0.0, 0.0, elapsed);

    print_detections(&result);
    success!(
        "{}: {}{:.1}ms postprocess",
        args.image.display(),
        result.verbose(),
        elapsed
    );
    Ok(())
}

/// Print one line per detection in verbose mode.
pub fn print_detections(result: &Detections) {
    if result.is_empty() {
        return;
    }
    section!("Detections");
    for det in result {
        let [x1, y1, x2, y2] = det.bbox.xyxy();
        verbose!(
            "  {:<16} {:.3}  [{:.1}, {:.1}, {:.1}, {:.1}]",
            result.label(det),
            det.confidence,
            x1,
            y1,
            x2,
            y2
        );
    }
}

/// Labels from a file, falling back to the descriptor's names.
///
/// # Errors
///
/// Returns [`InferenceError::ConfigError`] when neither source names any class.
pub fn load_catalog(
    labels: Option<&Path>,
    descriptor: Option<&ModelDescriptor>,
) -> Result<ClassCatalog> {
    let catalog = match (labels, descriptor) {
        (Some(path), _) => ClassCatalog::load(path)?,
        (None, Some(descriptor)) => descriptor.catalog(),
        (None, None) => ClassCatalog::default(),
    };
    if catalog.is_empty() {
        return Err(InferenceError::ConfigError(
            "no class names: pass --labels or a descriptor with names".to_string(),
        ));
    }
    Ok(catalog)
}

/// Read a raw little-endian `f32` tensor.
fn read_f32_le(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(InferenceError::OutputShape(format!(
            "{} holds {} bytes, not a whole number of f32 values",
            path.display(),
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_read_f32_le() {
        let dir = std::env::temp_dir();
        let path = dir.join("yolo_decode_read_f32_le.bin");
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();
        assert_eq!(read_f32_le(&path).unwrap(), vec![1.5, -2.0]);

        std::fs::write(&path, [0u8; 6]).unwrap();
        assert!(matches!(
            read_f32_le(&path),
            Err(InferenceError::OutputShape(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_catalog_sources() {
        let descriptor = ModelDescriptor::from_yaml_str("names:\n  0: cat\n  1: dog\n").unwrap();
        let catalog = load_catalog(None, Some(&descriptor)).unwrap();
        assert_eq!(catalog.get(1), Some("dog"));
        assert!(matches!(
            load_catalog(None, None),
            Err(InferenceError::ConfigError(_))
        ));
    }

    #[test]
    fn test_run_decode_reads_header_only() {
        let dir = std::env::temp_dir();
        let image = dir.join("yolo_decode_run_decode.png");
        let output = dir.join("yolo_decode_run_decode.bin");
        let labels = dir.join("yolo_decode_run_decode.txt");
        image::RgbImage::new(4, 2).save(&image).unwrap();
        // imgsz 32 with strides 8/16/32 gives 16 + 4 + 1 anchors of 4 + 2 values.
        std::fs::write(&output, vec![0u8; 21 * 6 * 4]).unwrap();
        std::fs::write(&labels, "cat\ndog\n").unwrap();

        let args = Cli::parse_from([
            "app",
            "decode",
            "-i",
            image.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--shape",
            "21,6",
            "-l",
            labels.to_str().unwrap(),
            "--imgsz",
            "32",
            "--verbose",
            "false",
        ]);
        let Commands::Decode(decode) = args.command else {
            panic!("expected decode");
        };
        assert!(run_decode(&decode).is_ok());

        for path in [&image, &output, &labels] {
            std::fs::remove_file(path).ok();
        }
    }
}
