// Colour reduction and rescaling.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use tracing::{debug, warn};

use super::is_empty;

/// Default upsampling factor applied before thresholding.
pub const DEFAULT_SCALE: f64 = 1.5;

/// Largest output `resize` will allocate (a 16384 x 16384 page).
pub const MAX_RESIZE_PIXELS: u64 = 1 << 28;

/// Convert any image to a single luma channel.
///
/// A single-channel input is copied unchanged.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Rescale by `scale` in both directions with bicubic (Catmull-Rom) filtering.
///
/// The output is `round(w * scale) x round(h * scale)`, never smaller than 1x1
/// for a non-empty input. A non-finite or non-positive scale returns a copy,
/// as does one whose output would exceed [`MAX_RESIZE_PIXELS`].
pub fn resize(gray: &GrayImage, scale: f64) -> GrayImage {
    if is_empty(gray) {
        return GrayImage::new(gray.width(), gray.height());
    }
    if !scale.is_finite() || scale <= 0.0 {
        warn!(scale, "Invalid resize scale; returning unchanged");
        return gray.clone();
    }
    let Some((width, height)) = scaled_dimensions(gray.dimensions(), scale) else {
        warn!(
            scale,
            width = gray.width(),
            height = gray.height(),
            "Resize output too large; returning unchanged"
        );
        return gray.clone();
    };
    if (width, height) == gray.dimensions() {
        return gray.clone();
    }

    debug!(width, height, scale, "Resizing");
    image::imageops::resize(gray, width, height, FilterType::CatmullRom)
}

/// Output size for `scale`, or `None` when it does not fit in `u32` or
/// exceeds [`MAX_RESIZE_PIXELS`].
fn scaled_dimensions((w, h): (u32, u32), scale: f64) -> Option<(u32, u32)> {
    let side = |n: u32| {
        let scaled = (n as f64 * scale).round();
        (scaled <= u32::MAX as f64).then(|| (scaled as u32).max(1))
    };
    let (width, height) = (side(w)?, side(h)?);
    let pixels = (width as u64).checked_mul(height as u64)?;
    (pixels <= MAX_RESIZE_PIXELS).then_some((width, height))
}
