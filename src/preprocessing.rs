// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for YOLO inference.
//!
//! This module turns a borrowed pixel buffer into a letterboxed, normalized NCHW tensor
//! and records the [`LetterboxTransform`] needed to map boxes back to the original image.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names
)]

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbImage;
use ndarray::Array4;
use rayon::prelude::*;
use wide::f32x4;

use crate::error::{InferenceError, Result};
use crate::results::BoundingBox;

// ================================================================================================
// Constants
// ================================================================================================

/// Letterbox padding color (mid-gray), matching the statistics the networks are trained on.
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Normalized letterbox padding value (114/255 ≈ 0.447).
const LETTERBOX_NORM: f32 = 114.0 / 255.0;

/// Reciprocal of 255 for normalization.
const INV_255: f32 = 1.0 / 255.0;

// ================================================================================================
// Image ingestion
// ================================================================================================

/// Byte order of the pixels handed to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    /// 3 bytes per pixel, red first.
    Rgb,
    /// 3 bytes per pixel, blue first.
    Bgr,
    /// 4 bytes per pixel, red first, alpha ignored.
    Rgba,
    /// 4 bytes per pixel, blue first, alpha ignored.
    Bgra,
}

impl ChannelOrder {
    /// Bytes occupied by one pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }

    /// Offsets of the red, green and blue bytes inside one pixel.
    const fn rgb_offsets(self) -> [usize; 3] {
        match self {
            Self::Rgb | Self::Rgba => [0, 1, 2],
            Self::Bgr | Self::Bgra => [2, 1, 0],
        }
    }
}

/// Channel order of the produced tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TensorOrder {
    /// Planes ordered R, G, B.
    #[default]
    Rgb,
    /// Planes ordered B, G, R.
    Bgr,
}

/// A borrowed, immutable pixel buffer with an explicit row stride.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    order: ChannelOrder,
}

impl<'a> ImageView<'a> {
    /// Wrap a pixel buffer.
    ///
    /// `stride` is the distance in bytes between the starts of two rows and may include
    /// row padding.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidImage`] if a dimension is zero, the stride is
    /// shorter than one row of pixels, or the buffer does not cover every row.
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        order: ChannelOrder,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(InferenceError::InvalidImage(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }

        let row_bytes = (width as usize)
            .checked_mul(order.bytes_per_pixel())
            .ok_or_else(|| InferenceError::InvalidImage("image row size overflows".to_string()))?;
        if stride < row_bytes {
            return Err(InferenceError::InvalidImage(format!(
                "stride {stride} is shorter than a row of {row_bytes} bytes"
            )));
        }

        // The last row does not need trailing padding.
        let required = stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or_else(|| InferenceError::InvalidImage("image size overflows".to_string()))?;
        if data.len() < required {
            return Err(InferenceError::InvalidImage(format!(
                "buffer holds {} bytes, {width}x{height} with stride {stride} needs {required}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            stride,
            order,
        })
    }

    /// Wrap a tightly packed buffer (no row padding).
    ///
    /// # Errors
    ///
    /// See [`ImageView::new`].
    pub fn packed(data: &'a [u8], width: u32, height: u32, order: ChannelOrder) -> Result<Self> {
        Self::new(data, width, height, width as usize * order.bytes_per_pixel(), order)
    }

    /// Borrow an RGB image from the `image` crate.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidImage`] for an empty image.
    pub fn from_rgb_image(image: &'a RgbImage) -> Result<Self> {
        Self::packed(image.as_raw(), image.width(), image.height(), ChannelOrder::Rgb)
    }

    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Byte order of the pixels.
    #[must_use]
    pub const fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Copy the pixels into a packed RGB buffer, dropping row padding and alpha.
    fn to_packed_rgb(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let bpp = self.order.bytes_per_pixel();
        let [ro, go, bo] = self.order.rgb_offsets();

        if self.order == ChannelOrder::Rgb && self.stride == w * 3 {
            return self.data[..w * h * 3].to_vec();
        }

        let mut out = Vec::with_capacity(w * h * 3);
        for row in self.data.chunks(self.stride).take(h) {
            for px in row[..w * bpp].chunks_exact(bpp) {
                out.extend_from_slice(&[px[ro], px[go], px[bo]]);
            }
        }
        out
    }
}

// ================================================================================================
// Letterbox geometry
// ================================================================================================

/// How the network input size is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizePolicy {
    /// Square `size x size` input.
    Fixed {
        /// Side length of the square input.
        size: u32,
    },
    /// Long side scaled to `size`, each dimension rounded up to a multiple of `stride`.
    StrideAligned {
        /// Target length of the long side.
        size: u32,
        /// Alignment of both dimensions.
        stride: u32,
    },
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::Fixed { size: 640 }
    }
}

impl SizePolicy {
    /// Target length of the long side.
    #[must_use]
    pub const fn target_size(&self) -> u32 {
        match self {
            Self::Fixed { size } | Self::StrideAligned { size, .. } => *size,
        }
    }

    /// Check that the sizes are positive.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] for a zero size or stride.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Fixed { size: 0 } | Self::StrideAligned { size: 0, .. } => Err(
                InferenceError::ConfigError("network input size must be positive".to_string()),
            ),
            Self::StrideAligned { stride: 0, .. } => Err(InferenceError::ConfigError(
                "alignment stride must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Parameters of one letterbox resize, and its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    /// Uniform scale from original to network pixels.
    pub scale: f32,
    /// Padding before the image on the x axis (left).
    pub pad_x: f32,
    /// Padding before the image on the y axis (top).
    pub pad_y: f32,
    /// Network input width.
    pub network_w: u32,
    /// Network input height.
    pub network_h: u32,
    /// Original image width.
    pub orig_w: u32,
    /// Original image height.
    pub orig_h: u32,
    /// Width of the resized image inside the padding.
    pub resized_w: u32,
    /// Height of the resized image inside the padding.
    pub resized_h: u32,
}

impl LetterboxTransform {
    /// Compute the letterbox for an `orig_w x orig_h` image.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidImage`] for a zero dimension and
    /// [`InferenceError::ConfigError`] for an invalid policy.
    pub fn compute(orig_w: u32, orig_h: u32, policy: SizePolicy) -> Result<Self> {
        if orig_w == 0 || orig_h == 0 {
            return Err(InferenceError::InvalidImage(format!(
                "image dimensions must be positive, got {orig_w}x{orig_h}"
            )));
        }
        policy.validate()?;

        let target = policy.target_size();
        let scale = target as f32 / orig_w.max(orig_h) as f32;

        let resized_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target);
        let resized_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target);

        let (network_w, network_h) = match policy {
            SizePolicy::Fixed { size } => (size, size),
            SizePolicy::StrideAligned { stride, .. } => (
                resized_w.div_ceil(stride) * stride,
                resized_h.div_ceil(stride) * stride,
            ),
        };

        // Floor split: the odd pixel, if any, goes after the image.
        let pad_x = (network_w - resized_w) / 2;
        let pad_y = (network_h - resized_h) / 2;

        Ok(Self {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            network_w,
            network_h,
            orig_w,
            orig_h,
            resized_w,
            resized_h,
        })
    }

    /// Padding after the image on the x axis (right).
    #[must_use]
    pub fn pad_right(&self) -> u32 {
        self.network_w - self.resized_w - self.pad_x as u32
    }

    /// Padding after the image on the y axis (bottom).
    #[must_use]
    pub fn pad_bottom(&self) -> u32 {
        self.network_h - self.resized_h - self.pad_y as u32
    }

    /// Map a network-space point to original-image space, without clipping.
    #[must_use]
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }

    /// Map an original-image point to network space.
    #[must_use]
    pub fn to_network(&self, x: f32, y: f32) -> (f32, f32) {
        (x.mul_add(self.scale, self.pad_x), y.mul_add(self.scale, self.pad_y))
    }

    /// Map a network-space box to original-image space and clip it to
    /// `[0, orig_w - 1] x [0, orig_h - 1]`.
    ///
    /// Each corner is clipped on its own; a box that ends up inverted gets zero extent.
    #[must_use]
    pub fn map_box(&self, bbox: &BoundingBox) -> BoundingBox {
        let scaled = scale_coords(&bbox.xyxy(), self);
        let [x0, y0, x1, y1] = clip_coords(&scaled, (self.orig_h, self.orig_w));
        BoundingBox::from_corners(x0, y0, x1, y1)
    }
}

/// Scale corner coordinates from network space back to original-image space.
#[must_use]
pub fn scale_coords(coords: &[f32; 4], transform: &LetterboxTransform) -> [f32; 4] {
    let (x1, y1) = transform.to_original(coords[0], coords[1]);
    let (x2, y2) = transform.to_original(coords[2], coords[3]);
    [x1, y1, x2, y2]
}

/// Clip corner coordinates to the last pixel of an image of shape (height, width).
#[must_use]
pub fn clip_coords(coords: &[f32; 4], shape: (u32, u32)) -> [f32; 4] {
    let max_x = shape.1.saturating_sub(1) as f32;
    let max_y = shape.0.saturating_sub(1) as f32;
    [
        coords[0].clamp(0.0, max_x),
        coords[1].clamp(0.0, max_y),
        coords[2].clamp(0.0, max_x),
        coords[3].clamp(0.0, max_y),
    ]
}

// ================================================================================================
// Tensor construction
// ================================================================================================

/// Result of preprocessing an image.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Letterboxed tensor in NCHW format, shape `(1, 3, network_h, network_w)`,
    /// values in [0, 1].
    pub tensor: Array4<f32>,
    /// Geometry of the letterbox, for mapping boxes back.
    pub transform: LetterboxTransform,
}

/// Preprocess an image for inference.
///
/// Resizes with a uniform scale, pads with [`LETTERBOX_COLOR`] and normalizes by 1/255.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidImage`] if the image cannot be resized, or
/// [`InferenceError::ConfigError`] for an invalid policy.
pub fn preprocess_image(
    image: &ImageView<'_>,
    policy: SizePolicy,
    order: TensorOrder,
) -> Result<PreprocessResult> {
    let transform = LetterboxTransform::compute(image.width(), image.height(), policy)?;
    let packed = image.to_packed_rgb();
    let resized = resize_rgb(
        packed,
        (image.width(), image.height()),
        (transform.resized_w, transform.resized_h),
    )?;
    let tensor = letterbox_tensor(&resized, &transform, order);

    tracing::trace!(
        orig_w = transform.orig_w,
        orig_h = transform.orig_h,
        network_w = transform.network_w,
        network_h = transform.network_h,
        scale = transform.scale,
        "letterboxed image"
    );

    Ok(PreprocessResult { tensor, transform })
}

/// Resize a packed RGB buffer with bilinear convolution.
fn resize_rgb(packed: Vec<u8>, src: (u32, u32), dst: (u32, u32)) -> Result<Vec<u8>> {
    if src == dst {
        return Ok(packed);
    }

    let src_image = Image::from_vec_u8(src.0, src.1, packed, PixelType::U8x3)
        .map_err(|e| InferenceError::InvalidImage(format!("failed to wrap source pixels: {e}")))?;
    let mut dst_image = Image::new(dst.0, dst.1, PixelType::U8x3);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| InferenceError::InvalidImage(format!("failed to resize image: {e}")))?;

    Ok(dst_image.into_vec())
}

/// Place the resized pixels inside a padded, normalized NCHW tensor.
///
/// Rows are filled in parallel; each row is written by exactly one task.
fn letterbox_tensor(
    resized: &[u8],
    transform: &LetterboxTransform,
    order: TensorOrder,
) -> Array4<f32> {
    let dst_w = transform.network_w as usize;
    let dst_h = transform.network_h as usize;
    let new_w = transform.resized_w as usize;
    let new_h = transform.resized_h as usize;
    let pad_left = transform.pad_x as usize;
    let pad_top = transform.pad_y as usize;
    let src_stride = new_w * 3;

    let mut tensor = Array4::from_elem((1, 3, dst_h, dst_w), LETTERBOX_NORM);
    let Some(data) = tensor.as_slice_mut() else {
        return tensor;
    };

    let (first, rest) = data.split_at_mut(dst_h * dst_w);
    let (green, third) = rest.split_at_mut(dst_h * dst_w);
    let (red, blue) = match order {
        TensorOrder::Rgb => (first, third),
        TensorOrder::Bgr => (third, first),
    };

    red.par_chunks_mut(dst_w)
        .zip(green.par_chunks_mut(dst_w))
        .zip(blue.par_chunks_mut(dst_w))
        .enumerate()
        .for_each(|(dy, ((r_row, g_row), b_row))| {
            if dy < pad_top || dy >= pad_top + new_h {
                return;
            }
            let offset = (dy - pad_top) * src_stride;
            let src_row = &resized[offset..offset + src_stride];
            let span = pad_left..pad_left + new_w;
            normalize_row(
                src_row,
                &mut r_row[span.clone()],
                &mut g_row[span.clone()],
                &mut b_row[span],
            );
        });

    tensor
}

/// De-interleave one RGB row into three planes, scaled by 1/255. Four pixels per step.
fn normalize_row(src: &[u8], r: &mut [f32], g: &mut [f32], b: &mut [f32]) {
    let inv_255 = f32x4::splat(INV_255);
    let n = r.len();
    let mut x = 0;

    while x + 4 <= n {
        let p = &src[x * 3..x * 3 + 12];
        let rv = f32x4::new([p[0].into(), p[3].into(), p[6].into(), p[9].into()]) * inv_255;
        let gv = f32x4::new([p[1].into(), p[4].into(), p[7].into(), p[10].into()]) * inv_255;
        let bv = f32x4::new([p[2].into(), p[5].into(), p[8].into(), p[11].into()]) * inv_255;

        let r_arr: [f32; 4] = rv.into();
        let g_arr: [f32; 4] = gv.into();
        let b_arr: [f32; 4] = bv.into();
        r[x..x + 4].copy_from_slice(&r_arr);
        g[x..x + 4].copy_from_slice(&g_arr);
        b[x..x + 4].copy_from_slice(&b_arr);
        x += 4;
    }

    // Scalar tail
    while x < n {
        r[x] = f32::from(src[x * 3]) * INV_255;
        g[x] = f32::from(src[x * 3 + 1]) * INV_255;
        b[x] = f32::from(src[x * 3 + 2]) * INV_255;
        x += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_wide_image_fixed() {
        let t = LetterboxTransform::compute(1280, 720, SizePolicy::Fixed { size: 640 }).unwrap();
        assert!((t.scale - 0.5).abs() < 1e-6);
        assert_eq!((t.network_w, t.network_h), (640, 640));
        assert_eq!((t.resized_w, t.resized_h), (640, 360));
        assert!(t.pad_x.abs() < 1e-6);
        assert!((t.pad_y - 140.0).abs() < 1e-6);
        assert_eq!(t.pad_bottom(), 140);
    }

    #[test]
    fn test_letterbox_stride_aligned() {
        let policy = SizePolicy::StrideAligned {
            size: 640,
            stride: 32,
        };
        let t = LetterboxTransform::compute(1280, 720, policy).unwrap();
        assert_eq!((t.network_w, t.network_h), (640, 384));
        assert!((t.pad_y - 12.0).abs() < 1e-6);
        assert_eq!(t.pad_bottom(), 12);

        // Odd slack: 300x100 -> 320x107 -> 320x128, pad 21 = 10 + 11
        let policy = SizePolicy::StrideAligned {
            size: 320,
            stride: 32,
        };
        let t = LetterboxTransform::compute(300, 100, policy).unwrap();
        assert_eq!((t.resized_w, t.resized_h), (320, 107));
        assert_eq!((t.network_w, t.network_h), (320, 128));
        assert!((t.pad_y - 10.0).abs() < 1e-6);
        assert_eq!(t.pad_bottom(), 11);
    }

    #[test]
    fn test_letterbox_tall_image_touches_height() {
        let t = LetterboxTransform::compute(480, 960, SizePolicy::Fixed { size: 320 }).unwrap();
        assert_eq!((t.resized_w, t.resized_h), (160, 320));
        assert!((t.pad_x - 80.0).abs() < 1e-6);
        assert!(t.pad_y.abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_rejects_empty() {
        let err = LetterboxTransform::compute(0, 10, SizePolicy::default()).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidImage(_)));
    }

    #[test]
    fn test_round_trip_mapping() {
        let t = LetterboxTransform::compute(1280, 720, SizePolicy::Fixed { size: 640 }).unwrap();
        let original = BoundingBox::from_corners(100.0, 50.0, 400.0, 300.0);
        let (nx0, ny0) = t.to_network(100.0, 50.0);
        let (nx1, ny1) = t.to_network(400.0, 300.0);
        let mapped = t.map_box(&BoundingBox::from_corners(nx0, ny0, nx1, ny1));
        assert!((mapped.x - original.x).abs() < 1e-3);
        assert!((mapped.y - original.y).abs() < 1e-3);
        assert!((mapped.width - original.width).abs() < 1e-3);
        assert!((mapped.height - original.height).abs() < 1e-3);
    }

    #[test]
    fn test_map_box_clips_to_last_pixel() {
        let t = LetterboxTransform::compute(1280, 720, SizePolicy::Fixed { size: 640 }).unwrap();
        // Spills into the top padding and past the right edge.
        let mapped = t.map_box(&BoundingBox::from_corners(600.0, 100.0, 700.0, 200.0));
        assert!((mapped.x - 1200.0).abs() < 1e-6);
        assert!(mapped.y.abs() < 1e-6);
        assert!((mapped.x + mapped.width - 1279.0).abs() < 1e-6);
        assert!((mapped.y + mapped.height - 120.0).abs() < 1e-6);

        // Entirely inside the padding collapses to zero height.
        let mapped = t.map_box(&BoundingBox::from_corners(10.0, 0.0, 50.0, 100.0));
        assert!(mapped.y.abs() < 1e-6);
        assert!(mapped.height.abs() < 1e-6);
    }

    #[test]
    fn test_clip_coords() {
        let clipped = clip_coords(&[-10.0, -20.0, 700.0, 500.0], (480, 640));
        assert!(clipped[0].abs() < 1e-6);
        assert!(clipped[1].abs() < 1e-6);
        assert!((clipped[2] - 639.0).abs() < 1e-6);
        assert!((clipped[3] - 479.0).abs() < 1e-6);
    }

    #[test]
    fn test_image_view_validation() {
        let data = vec![0u8; 10 * 4 * 3];
        assert!(ImageView::packed(&data, 10, 4, ChannelOrder::Rgb).is_ok());
        assert!(matches!(
            ImageView::packed(&data, 0, 4, ChannelOrder::Rgb),
            Err(InferenceError::InvalidImage(_))
        ));
        assert!(matches!(
            ImageView::new(&data, 10, 4, 20, ChannelOrder::Rgb),
            Err(InferenceError::InvalidImage(_))
        ));
        assert!(matches!(
            ImageView::packed(&data, 10, 5, ChannelOrder::Rgb),
            Err(InferenceError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_padded_rows_and_channel_order() {
        // 2x2 BGRA image with 4 bytes of row padding.
        let stride = 2 * 4 + 4;
        let mut data = vec![0xEEu8; stride * 2];
        for y in 0..2 {
            for x in 0..2 {
                let o = y * stride + x * 4;
                data[o..o + 4].copy_from_slice(&[30, 20, 10, 255]);
            }
        }
        let view = ImageView::new(&data, 2, 2, stride, ChannelOrder::Bgra).unwrap();
        assert_eq!(view.to_packed_rgb(), vec![10, 20, 30, 10, 20, 30, 10, 20, 30, 10, 20, 30]);
    }

    #[test]
    fn test_preprocess_pads_and_normalizes() {
        // 8x4 image fits an 8x8 input without resizing: 2 rows of padding above and below.
        let pixels: Vec<u8> = (0..8 * 4).flat_map(|_| [255u8, 0, 51]).collect();
        let view = ImageView::packed(&pixels, 8, 4, ChannelOrder::Rgb).unwrap();
        let result = preprocess_image(&view, SizePolicy::Fixed { size: 8 }, TensorOrder::Rgb)
            .unwrap();

        assert_eq!(result.tensor.shape(), &[1, 3, 8, 8]);
        assert!((result.transform.pad_y - 2.0).abs() < 1e-6);
        for c in 0..3 {
            assert!((result.tensor[[0, c, 0, 0]] - (114.0 / 255.0)).abs() < 1e-6);
            assert!((result.tensor[[0, c, 7, 7]] - (114.0 / 255.0)).abs() < 1e-6);
        }
        assert!((result.tensor[[0, 0, 2, 5]] - 1.0).abs() < 1e-6);
        assert!(result.tensor[[0, 1, 3, 0]].abs() < 1e-6);
        assert!((result.tensor[[0, 2, 5, 7]] - 0.2).abs() < 1e-6);

        let bgr = preprocess_image(&view, SizePolicy::Fixed { size: 8 }, TensorOrder::Bgr)
            .unwrap();
        assert!((bgr.tensor[[0, 0, 2, 5]] - 0.2).abs() < 1e-6);
        assert!((bgr.tensor[[0, 2, 2, 5]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_resizes_uniform_image() {
        let pixels: Vec<u8> = (0..100 * 50).flat_map(|_| [200u8, 100, 50]).collect();
        let view = ImageView::packed(&pixels, 100, 50, ChannelOrder::Rgb).unwrap();
        let result = preprocess_image(&view, SizePolicy::Fixed { size: 64 }, TensorOrder::Rgb)
            .unwrap();

        assert_eq!((result.transform.resized_w, result.transform.resized_h), (64, 32));
        assert!((result.transform.pad_y - 16.0).abs() < 1e-6);
        // Interior keeps the flat color within one quantization step.
        assert!((result.tensor[[0, 0, 32, 32]] - (200.0 / 255.0)).abs() < 1.5 / 255.0);
        assert!((result.tensor[[0, 2, 20, 3]] - (50.0 / 255.0)).abs() < 1.5 / 255.0);
        assert!((result.tensor[[0, 1, 5, 3]] - (114.0 / 255.0)).abs() < 1e-6);
    }
}
