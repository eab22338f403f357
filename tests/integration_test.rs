// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! End-to-end tests: image in, engine stand-in, detections out in original coordinates.

use ndarray::Array4;
use yolo_decode::{
    BoundingBox, ChannelOrder, ClassCatalog, DecodeStyle, Detector, ImageView, InferenceConfig,
    InferenceError, LetterboxTransform, OutputTensor, Result, SizePolicy, generate_grid,
    postprocess,
};

const ANCHORS_640: usize = 8400;
const ANCHORS_320: usize = 2100;
const REG_MAX: usize = 16;

fn catalog() -> ClassCatalog {
    ClassCatalog::from_text("person\ncar\n")
}

fn assert_box(actual: &BoundingBox, expected: [f32; 4]) {
    assert!((actual.x - expected[0]).abs() < 1e-2);
    assert!((actual.y - expected[1]).abs() < 1e-2);
    assert!((actual.width - expected[2]).abs() < 1e-2);
    assert!((actual.height - expected[3]).abs() < 1e-2);
}

/// Direct head in `[1, 4 + nc, anchors]` layout with the given rows set.
fn direct_output(rows: &[(usize, [f32; 6])]) -> OutputTensor {
    let mut data = vec![0.0; 6 * ANCHORS_640];
    for &(anchor, values) in rows {
        for (c, v) in values.iter().enumerate() {
            data[c * ANCHORS_640 + anchor] = *v;
        }
    }
    OutputTensor::new(data, vec![1, 6, ANCHORS_640]).unwrap()
}

/// DFL head in `[1, anchors, 4 * reg_max + nc]` layout. Every side of `anchor` peaks at
/// `bin`; all class logits are strongly negative except `logits` on that anchor.
fn dfl_output(anchors: usize, anchor: usize, bin: usize, logits: [f32; 2]) -> OutputTensor {
    let width = 4 * REG_MAX + 2;
    let mut data = vec![0.0; anchors * width];
    for row in data.chunks_exact_mut(width) {
        row[4 * REG_MAX] = -10.0;
        row[4 * REG_MAX + 1] = -10.0;
    }
    let row = &mut data[anchor * width..(anchor + 1) * width];
    for side in 0..4 {
        row[side * REG_MAX + bin] = 20.0;
    }
    row[4 * REG_MAX..].copy_from_slice(&logits);
    OutputTensor::new(data, vec![1, anchors, width]).unwrap()
}

#[test]
fn test_direct_pipeline_maps_to_original() {
    let output = direct_output(&[
        (100, [320.0, 320.0, 100.0, 50.0, 0.1, 0.9]),
        // Same class, heavy overlap, lower score: suppressed.
        (101, [322.0, 320.0, 100.0, 50.0, 0.1, 0.8]),
        // Same box, other class: kept.
        (102, [320.0, 320.0, 100.0, 50.0, 0.7, 0.0]),
    ]);
    let engine = move |input: &Array4<f32>| -> Result<OutputTensor> {
        assert_eq!(input.dim(), (1, 3, 640, 640));
        Ok(output.clone())
    };

    let mut detector = Detector::new(engine, catalog(), InferenceConfig::new()).unwrap();
    let pixels = vec![90u8; 1280 * 720 * 3];
    let image = ImageView::packed(&pixels, 1280, 720, ChannelOrder::Rgb).unwrap();
    let result = detector.detect(&image).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.orig_shape, (720, 1280));
    assert_eq!(result.inference_shape, (640, 640));

    let first = &result.detections[0];
    assert_eq!(result.label(first), "car");
    assert!((first.confidence - 0.9).abs() < 1e-6);
    assert_box(&first.bbox, [540.0, 310.0, 200.0, 100.0]);

    let second = &result.detections[1];
    assert_eq!(second.class_id, 0);
    assert_box(&second.bbox, [540.0, 310.0, 200.0, 100.0]);
    assert_eq!(result.verbose(), "1 person, 1 car, ");
    assert!(result.speed.total() >= 0.0);
}

#[test]
fn test_agnostic_nms_across_classes() {
    let output = direct_output(&[
        (0, [320.0, 320.0, 100.0, 50.0, 0.1, 0.9]),
        (1, [320.0, 320.0, 100.0, 50.0, 0.7, 0.0]),
    ]);
    let engine = move |_: &Array4<f32>| -> Result<OutputTensor> { Ok(output.clone()) };
    let config = InferenceConfig::new().with_agnostic_nms(true);
    let mut detector = Detector::new(engine, catalog(), config).unwrap();

    let pixels = vec![0u8; 640 * 640 * 3];
    let image = ImageView::packed(&pixels, 640, 640, ChannelOrder::Rgb).unwrap();
    let result = detector.detect(&image).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.detections[0].class_id, 1);
}

#[test]
fn test_dfl_pipeline_with_padding() {
    // Stride-8 anchor (20, 20): center (164, 164); bin 5 puts each side 40 px away.
    let output = dfl_output(ANCHORS_320, 20 * 40 + 20, 5, [-10.0, 3.0]);
    let mut calls = 0usize;
    let engine = move |input: &Array4<f32>| -> Result<OutputTensor> {
        calls += 1;
        assert_eq!(input.dim(), (1, 3, 320, 320));
        if calls == 1 {
            // Warmup runs on a blank tensor.
            assert!(input.iter().all(|v| v.abs() < f32::EPSILON));
            return Ok(output.clone());
        }
        // 640x480 at scale 0.5 leaves 40 rows of padding on top.
        assert!((input[[0, 0, 0, 0]] - (114.0 / 255.0)).abs() < 1e-6);
        assert!((input[[0, 0, 160, 160]] - (200.0 / 255.0)).abs() < 1e-2);
        Ok(output.clone())
    };

    let config = InferenceConfig::for_style(DecodeStyle::dfl())
        .with_size_policy(SizePolicy::Fixed { size: 320 });
    let mut detector = Detector::new(engine, catalog(), config).unwrap();

    let pixels = vec![200u8; 640 * 480 * 3];
    let image = ImageView::packed(&pixels, 640, 480, ChannelOrder::Rgb).unwrap();
    let result = detector.detect(&image).unwrap();

    assert_eq!(result.len(), 1);
    let det = &result.detections[0];
    assert_eq!(det.class_id, 1);
    assert!((det.confidence - (1.0 / (1.0 + (-3.0f32).exp()))).abs() < 1e-5);
    assert_box(&det.bbox, [248.0, 168.0, 160.0, 160.0]);
}

#[test]
fn test_stride_aligned_decode_clips_to_image() {
    let transform = LetterboxTransform::compute(
        1280,
        720,
        SizePolicy::StrideAligned {
            size: 640,
            stride: 32,
        },
    )
    .unwrap();
    assert_eq!((transform.network_w, transform.network_h), (640, 384));
    assert!((transform.pad_y - 12.0).abs() < 1e-6);

    let strides = [8, 16, 32];
    let grid = generate_grid(transform.network_w, transform.network_h, &strides);
    assert_eq!(grid.len(), 80 * 48 + 40 * 24 + 20 * 12);

    // First anchor: center (4, 4), each side 16 px, box (-12, -12) to (20, 20).
    let output = dfl_output(grid.len(), 0, 2, [2.0, -10.0]);
    let config = InferenceConfig::for_style(DecodeStyle::dfl());
    let detections = postprocess(&output, &grid, 2, &transform, &config).unwrap();

    assert_eq!(detections.len(), 1);
    assert_box(&detections[0].bbox, [0.0, 0.0, 40.0, 16.0]);
}

#[test]
fn test_bgra_frame_with_row_padding() {
    let output = direct_output(&[(5, [320.0, 320.0, 64.0, 64.0, 0.6, 0.0])]);
    let engine = move |_: &Array4<f32>| -> Result<OutputTensor> { Ok(output.clone()) };
    let mut detector = Detector::new(engine, catalog(), InferenceConfig::new()).unwrap();

    // 320x320 BGRA with 16 bytes of row padding.
    let stride = 320 * 4 + 16;
    let pixels = vec![255u8; stride * 320];
    let image = ImageView::new(&pixels, 320, 320, stride, ChannelOrder::Bgra).unwrap();
    let result = detector.detect(&image).unwrap();

    assert_eq!(result.len(), 1);
    assert_box(&result.detections[0].bbox, [144.0, 144.0, 32.0, 32.0]);
}

#[test]
fn test_class_count_mismatch_releases_detector() {
    let engine =
        |_: &Array4<f32>| OutputTensor::new(vec![0.0; 7 * ANCHORS_640], vec![1, 7, ANCHORS_640]);
    let mut detector = Detector::new(engine, catalog(), InferenceConfig::new()).unwrap();

    let pixels = vec![0u8; 64 * 64 * 3];
    let image = ImageView::packed(&pixels, 64, 64, ChannelOrder::Rgb).unwrap();
    let err = detector.detect(&image).unwrap_err();
    assert!(matches!(
        err,
        InferenceError::CatalogMismatch {
            expected: 2,
            found: 3
        }
    ));
    assert!(!detector.is_initialized());
    assert!(matches!(
        detector.detect(&image),
        Err(InferenceError::NotInitialized)
    ));
}

#[test]
fn test_invalid_image_does_not_poison_detector() {
    let output = direct_output(&[]);
    let engine = move |_: &Array4<f32>| -> Result<OutputTensor> { Ok(output.clone()) };
    let mut detector = Detector::new(engine, catalog(), InferenceConfig::new()).unwrap();

    let short = vec![0u8; 10];
    assert!(ImageView::packed(&short, 64, 64, ChannelOrder::Rgb).is_err());

    let pixels = vec![0u8; 64 * 64 * 3];
    let image = ImageView::packed(&pixels, 64, 64, ChannelOrder::Rgb).unwrap();
    let result = detector.detect(&image).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.verbose(), "(no detections), ");
}
