// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::{Path, PathBuf};

use yolo_decode::{
    Detector, ImageView, InferenceError, ModelDescriptor, OrtEngine, Result, VERSION,
};

use crate::cli::args::PredictArgs;
use crate::cli::decode::{load_catalog, print_detections};
use crate::{error, success, verbose, warn};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Run an ONNX model over an image or every image in a directory.
///
/// A frame that fails to load or decode is reported and skipped.
///
/// # Errors
///
/// Returns an error if the model, descriptor, labels or source cannot be loaded, or the
/// detector fails its warmup.
#[allow(clippy::cast_precision_loss)]
pub fn run_prediction(args: &PredictArgs) -> Result<()> {
    let engine = OrtEngine::load(&args.model, args.threads)?;
    let descriptor = match &args.pipeline.descriptor {
        Some(path) => Some(ModelDescriptor::load(path)?),
        None => engine.descriptor().cloned(),
    };
    let config = args.pipeline.to_config(descriptor.as_ref());
    if descriptor.is_none() {
        warn!("No model descriptor found, decoding as {}", config.style);
    }
    let catalog = load_catalog(args.labels.as_deref(), descriptor.as_ref())?;
    let sources = collect_sources(&args.source)?;

    println!("Ultralytics {VERSION} 🚀 Rust ONNX CPU");
    verbose!(
        "{}: {} classes, style {}, {:?}",
        args.model.display(),
        catalog.len(),
        config.style,
        config.size_policy
    );

    let mut detector = Detector::new(engine, catalog, config)?;
    detector.warmup()?;

    let total = sources.len();
    let (mut pre, mut inf, mut post) = (0.0, 0.0, 0.0);
    let mut processed = 0usize;
    let mut last_shape = (0, 0);

    for (index, path) in sources.iter().enumerate() {
        let image = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                error!("{}: {e}", path.display());
                continue;
            }
        };
        let result = ImageView::from_rgb_image(&image).and_then(|view| detector.detect(&view));
        let result = match result {
            Ok(result) => result,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("{}: {e}", path.display());
                continue;
            }
        };

        verbose!(
            "image {}/{} {}: {}x{} {}{:.1}ms",
            index + 1,
            total,
            path.display(),
            result.inference_shape.0,
            result.inference_shape.1,
            result.verbose(),
            result.speed.inference.unwrap_or(0.0)
        );
        print_detections(&result);

        pre += result.speed.preprocess.unwrap_or(0.0);
        inf += result.speed.inference.unwrap_or(0.0);
        post += result.speed.postprocess.unwrap_or(0.0);
        last_shape = result.inference_shape;
        processed += 1;
    }

    let n = processed.max(1) as f64;
    success!(
        "Speed: {:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess per image at shape (1, 3, {}, {})",
        pre / n,
        inf / n,
        post / n,
        last_shape.0,
        last_shape.1
    );
    Ok(())
}

/// A single image, or the images in a directory sorted by name.
fn collect_sources(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.is_dir() {
        return Err(InferenceError::InvalidImage(format!(
            "Source not found: {}",
            source.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(source)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_image_file(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(InferenceError::InvalidImage(format!(
            "No images found in {}",
            source.display()
        )));
    }
    Ok(paths)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("frame.png")));
        assert!(!is_image_file(Path::new("model.onnx")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[test]
    fn test_listed_extensions_are_decodable() {
        for ext in IMAGE_EXTENSIONS {
            let format = image::ImageFormat::from_extension(ext);
            assert!(
                format.is_some_and(|f| f.reading_enabled()),
                "no decoder enabled for .{ext}"
            );
        }
    }

    #[test]
    fn test_missing_source() {
        assert!(collect_sources(Path::new("does/not/exist")).is_err());
    }
}
