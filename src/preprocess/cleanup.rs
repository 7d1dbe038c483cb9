// Noise, background and contrast cleanup.

use image::{GrayImage, Luma};
use imageproc::contrast::equalize_histogram;
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::open;
use tracing::{debug, instrument};

use super::is_empty;
use super::threshold::{ThresholdParams, adaptive_threshold, binarize_otsu_inv};

/// Bilateral window radius (a 9-tap diameter).
const BILATERAL_RADIUS: i32 = 4;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPACE: f32 = 75.0;

/// Fraction of the content box added as margin by [`remove_borders`].
const BORDER_MARGIN: f64 = 0.10;

/// 3x3 median filter followed by an edge-preserving bilateral filter.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn denoise(gray: &GrayImage) -> GrayImage {
    if is_empty(gray) {
        return gray.clone();
    }
    let median = median_filter(gray, 1, 1);
    bilateral_filter(
        &median,
        BILATERAL_RADIUS,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPACE,
    )
}

/// Bilateral smoothing over a circular window of `radius`.
fn bilateral_filter(
    gray: &GrayImage,
    radius: i32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let color_weight: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let mut offsets: Vec<(i32, i32, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2 <= (radius * radius) as f32 {
                offsets.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }

    let (width, height) = gray.dimensions();
    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);
    GrayImage::from_fn(width, height, |x, y| {
        let center = gray.get_pixel(x, y).0[0];
        let mut sum = 0f32;
        let mut norm = 0f32;
        for &(dx, dy, space_w) in &offsets {
            let sx = (x as i32 + dx).clamp(0, max_x) as u32;
            let sy = (y as i32 + dy).clamp(0, max_y) as u32;
            let v = gray.get_pixel(sx, sy).0[0];
            let w = space_w * color_weight[center.abs_diff(v) as usize];
            sum += w * v as f32;
            norm += w;
        }
        Luma([(sum / norm).round().clamp(0.0, 255.0) as u8])
    })
}

/// Flatten the paper to white: mean adaptive threshold (block 31, bias 15)
/// followed by a 3x3 morphological opening of the paper.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn remove_background(gray: &GrayImage) -> GrayImage {
    if is_empty(gray) {
        return gray.clone();
    }
    let binary = adaptive_threshold(gray, &ThresholdParams::mean(31, 15));
    open(&binary, Norm::LInf, 1)
}

/// Histogram equalization followed by a gamma curve.
///
/// `gamma > 1` lightens, `gamma < 1` darkens, `1.0` leaves the equalized
/// image as is. A non-finite or non-positive gamma is ignored.
#[instrument(skip(gray))]
pub fn enhance_contrast(gray: &GrayImage, gamma: f64) -> GrayImage {
    if is_empty(gray) {
        return gray.clone();
    }
    let mut equalized = equalize_histogram(gray);
    if gamma.is_finite() && gamma > 0.0 && (gamma - 1.0).abs() > f64::EPSILON {
        let lut: Vec<u8> = (0..256)
            .map(|v| ((v as f64 / 255.0).powf(1.0 / gamma) * 255.0).round() as u8)
            .collect();
        for p in equalized.pixels_mut() {
            p.0[0] = lut[p.0[0] as usize];
        }
    }
    equalized
}

/// Crop away empty margins and scanner borders: keep the bounding box of the
/// dark content plus a 10% margin on every side, clamped to the image.
///
/// A page without dark content is returned unchanged.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn remove_borders(gray: &GrayImage) -> GrayImage {
    if is_empty(gray) {
        return gray.clone();
    }

    let ink = binarize_otsu_inv(gray);
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in ink.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let Some((x0, y0, x1, y1)) = bounds else {
        return gray.clone();
    };

    let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);
    let margin_x = (w as f64 * BORDER_MARGIN) as u32;
    let margin_y = (h as f64 * BORDER_MARGIN) as u32;
    let left = x0.saturating_sub(margin_x);
    let top = y0.saturating_sub(margin_y);
    let right = (x1 + margin_x).min(gray.width() - 1);
    let bottom = (y1 + margin_y).min(gray.height() - 1);

    debug!(left, top, right, bottom, "Cropping to content");
    image::imageops::crop_imm(gray, left, top, right - left + 1, bottom - top + 1).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denoise_removes_salt_noise() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([255]));
        img.put_pixel(10, 10, Luma([0]));
        let out = denoise(&img);
        assert_eq!(out.dimensions(), (20, 20));
        assert!(out.get_pixel(10, 10).0[0] > 200);
    }

    #[test]
    fn test_bilateral_preserves_flat_image() {
        let img = GrayImage::from_pixel(9, 9, Luma([120]));
        assert_eq!(bilateral_filter(&img, 4, 75.0, 75.0), img);
    }

    #[test]
    fn test_remove_background_is_binary() {
        let img = GrayImage::from_fn(64, 64, |x, y| {
            if (20..40).contains(&y) && (10..50).contains(&x) {
                Luma([30])
            } else {
                Luma([(180 + x) as u8])
            }
        });
        let out = remove_background(&img);
        assert_eq!(out.dimensions(), img.dimensions());
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_enhance_contrast_stretches_range() {
        let img = GrayImage::from_fn(16, 16, |x, _| Luma([100 + x as u8]));
        let out = enhance_contrast(&img, 1.0);
        let max = out.pixels().map(|p| p.0[0]).max().unwrap();
        let min = out.pixels().map(|p| p.0[0]).min().unwrap();
        assert!(max - min > 15);
    }

    #[test]
    fn test_enhance_contrast_gamma_lightens() {
        let img = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 16) as u8]));
        let plain = enhance_contrast(&img, 1.0);
        let light = enhance_contrast(&img, 2.0);
        let sum = |g: &GrayImage| g.pixels().map(|p| p.0[0] as u64).sum::<u64>();
        assert!(sum(&light) > sum(&plain));
    }

    #[test]
    fn test_remove_borders_crops_to_content() {
        let img = GrayImage::from_fn(200, 100, |x, y| {
            if (50..150).contains(&x) && (40..60).contains(&y) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let out = remove_borders(&img);
        // 100x20 content + 10% margin each side.
        assert_eq!(out.dimensions(), (120, 24));
    }

    #[test]
    fn test_remove_borders_blank_unchanged() {
        let img = GrayImage::from_pixel(30, 30, Luma([255]));
        assert_eq!(remove_borders(&img), img);
    }

    #[test]
    fn test_cleanup_empty_inputs() {
        let empty = GrayImage::new(0, 0);
        assert!(is_empty(&denoise(&empty)));
        assert!(is_empty(&remove_background(&empty)));
        assert!(is_empty(&enhance_contrast(&empty, 1.0)));
        assert!(is_empty(&remove_borders(&empty)));
    }
}
