// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use yolo_decode::grid::grid_len;
use yolo_decode::inference::DEFAULT_STRIDES;
use yolo_decode::{LetterboxTransform, Result};

use crate::cli::args::GeometryArgs;
use crate::{success, verbose};

/// Print the letterbox placement and anchor count for an image size.
///
/// # Errors
///
/// Returns an error for a zero image size or an invalid policy.
pub fn run_geometry(args: &GeometryArgs) -> Result<()> {
    let transform = LetterboxTransform::compute(args.width, args.height, args.size_policy())?;

    verbose!("original   {}x{}", transform.orig_w, transform.orig_h);
    verbose!("resized    {}x{}", transform.resized_w, transform.resized_h);
    verbose!("network    {}x{}", transform.network_w, transform.network_h);
    verbose!("scale      {:.6}", transform.scale);
    verbose!(
        "padding    left {} top {} right {} bottom {}",
        transform.pad_x,
        transform.pad_y,
        transform.pad_right(),
        transform.pad_bottom()
    );

    let strides = DEFAULT_STRIDES;
    let anchors = grid_len(transform.network_w, transform.network_h, &strides);
    success!(
        "{}x{} -> {}x{} ({} anchors at strides {:?})",
        args.width,
        args.height,
        transform.network_w,
        transform.network_h,
        anchors,
        strides
    );
    Ok(())
}
