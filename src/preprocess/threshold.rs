// Binarization: local adaptive thresholds and global Otsu.
//
// Convention for every function in this file unless noted: ink = 0, paper = 255.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::is_empty;

/// How the local threshold surface is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Gaussian-weighted neighbourhood mean.
    #[default]
    Gaussian,
    /// Unweighted box mean.
    Mean,
}

/// Parameters of [`adaptive_threshold`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdParams {
    pub method: ThresholdMethod,
    /// Side of the square neighbourhood in pixels; forced odd and >= 3.
    pub block_size: u32,
    /// Constant subtracted from the local mean.
    pub bias: i32,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        ThresholdParams {
            method: ThresholdMethod::Gaussian,
            block_size: 31,
            bias: 10,
        }
    }
}

impl ThresholdParams {
    pub fn mean(block_size: u32, bias: i32) -> Self {
        ThresholdParams {
            method: ThresholdMethod::Mean,
            block_size,
            bias,
        }
    }

    fn odd_block(&self) -> u32 {
        self.block_size.max(3) | 1
    }
}

/// Local adaptive binarization.
///
/// A pixel becomes paper (255) when it is brighter than its neighbourhood
/// mean minus `bias`, ink (0) otherwise. Scans with uneven illumination need
/// this instead of a single global cut.
pub fn adaptive_threshold(gray: &GrayImage, params: &ThresholdParams) -> GrayImage {
    if is_empty(gray) {
        return GrayImage::new(gray.width(), gray.height());
    }

    let block = params.odd_block();
    debug!(block, bias = params.bias, method = ?params.method, "Adaptive threshold");

    let (width, height) = gray.dimensions();
    let local_mean: Box<dyn Fn(u32, u32) -> f64> = match params.method {
        ThresholdMethod::Gaussian => {
            // Same sigma OpenCV derives for a kernel of this size.
            let sigma = 0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8;
            let blurred = gaussian_blur_f32(gray, sigma);
            Box::new(move |x, y| blurred.get_pixel(x, y).0[0] as f64)
        }
        ThresholdMethod::Mean => {
            let integral = integral_image(gray);
            let radius = block / 2;
            Box::new(move |x, y| region_mean(&integral, width, height, x, y, radius))
        }
    };

    GrayImage::from_fn(width, height, |x, y| {
        let threshold = local_mean(x, y).round() as i32 - params.bias;
        let value = gray.get_pixel(x, y).0[0] as i32;
        if value > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Otsu threshold level, or `None` when the image has a single intensity.
pub fn otsu_level(gray: &GrayImage) -> Option<u8> {
    let mut pixels = gray.pixels().map(|p| p.0[0]);
    let first = pixels.next()?;
    if pixels.all(|v| v == first) {
        return None;
    }
    Some(imageproc::contrast::otsu_level(gray))
}

/// Global Otsu binarization with ink = 0, paper = 255.
///
/// A single-intensity image has no threshold to find: it is all ink when
/// that intensity is dark (< 128) and all paper otherwise.
pub fn binarize_otsu(gray: &GrayImage) -> GrayImage {
    binarize_with(gray, 0, 255)
}

/// Inverted global Otsu binarization: ink = 255 (foreground), paper = 0.
pub fn binarize_otsu_inv(gray: &GrayImage) -> GrayImage {
    binarize_with(gray, 255, 0)
}

fn binarize_with(gray: &GrayImage, ink: u8, paper: u8) -> GrayImage {
    let Some(level) = otsu_level(gray) else {
        let dark = gray.pixels().next().is_some_and(|p| p.0[0] < 128);
        let fill = if dark { ink } else { paper };
        return GrayImage::from_pixel(gray.width(), gray.height(), Luma([fill]));
    };
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] <= level {
            Luma([ink])
        } else {
            Luma([paper])
        }
    })
}

/// Summed-area table with a zero-padded first row and column.
///
/// `table[y * (width + 1) + x]` holds the sum of all pixels in `[0, x) x [0, y)`.
fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

/// Mean over the square of `radius` around `(cx, cy)`, clipped to the image.
fn region_mean(
    integral: &[u64],
    img_width: u32,
    img_height: u32,
    cx: u32,
    cy: u32,
    radius: u32,
) -> f64 {
    let stride = (img_width + 1) as usize;

    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(img_width as usize);
    let y2 = ((cy + radius + 1) as usize).min(img_height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }

    let sum = integral[y2 * stride + x2] as f64 - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;

    sum / area
}
