// Text-region segmentation on single-channel images.

pub mod confidence;
pub mod lines;
pub mod words;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::raster::RawImage;

pub use confidence::segment_with_confidence;
pub use lines::segment_lines;
pub use words::segment_words;

/// Axis-aligned box in pixel coordinates (origin top-left, y down).
///
/// Every box handed out by this module has `w > 0`, `h > 0` and lies inside
/// the image it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        BBox { x, y, w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// True when the box is non-degenerate and inside a `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.w > 0
            && self.h > 0
            && self.x as u64 + self.w as u64 <= width as u64
            && self.y as u64 + self.h as u64 <= height as u64
    }
}

/// A line box with the ink density of its re-binarized crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredBox {
    #[serde(flatten)]
    pub bbox: BBox,
    /// Foreground fraction in `[0, 1]`; a density heuristic, not a probability.
    pub confidence: f32,
}

/// Tunable thresholds of the segmenters.
///
/// The defaults were tuned on ~300 DPI invoice scans; other sources usually
/// need `min_row_sum` and `min_line_height` adjusted first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// A row belongs to a line when its ink count exceeds this.
    /// `None` means `image_width / 20`.
    pub min_row_sum: Option<u32>,
    /// A band is kept only when taller than this many rows.
    pub min_line_height: u32,
    /// Word components narrower or shorter than this are noise.
    pub min_word_size: u32,
    /// Emit a band that is still open at the last row.
    pub emit_open_band: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            min_row_sum: None,
            min_line_height: 8,
            min_word_size: 5,
            emit_open_band: false,
        }
    }
}

impl SegmentConfig {
    pub fn row_threshold(&self, image_width: u32) -> u32 {
        self.min_row_sum.unwrap_or(image_width / 20)
    }
}

/// Line segmentation of a raw buffer; rejects empty or multi-channel input.
pub fn segment_lines_raw(image: &RawImage, config: &SegmentConfig) -> Result<Vec<BBox>> {
    segment_lines(&image.to_gray_strict()?, config)
}

/// Word segmentation of a raw buffer; rejects empty or multi-channel input.
pub fn segment_words_raw(image: &RawImage, config: &SegmentConfig) -> Result<Vec<BBox>> {
    segment_words(&image.to_gray_strict()?, config)
}

/// Scored line segmentation of a raw buffer; rejects empty or multi-channel input.
pub fn segment_with_confidence_raw(
    image: &RawImage,
    config: &SegmentConfig,
) -> Result<Vec<ScoredBox>> {
    segment_with_confidence(&image.to_gray_strict()?, config)
}
