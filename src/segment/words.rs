// Word segmentation from external connected-component outlines.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use tracing::{debug, instrument};

use super::{BBox, SegmentConfig};
use crate::error::{DocSegError, Result};
use crate::preprocess::threshold::binarize_otsu_inv;

/// Segment a grayscale page into word-like blobs.
///
/// Only outermost outlines are used, so the counters of letters such as "o"
/// never produce boxes of their own. Components narrower or shorter than
/// `min_word_size` are dropped as noise.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn segment_words(gray: &GrayImage, config: &SegmentConfig) -> Result<Vec<BBox>> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(DocSegError::invalid_argument(format!(
            "empty image ({}x{})",
            width, height
        )));
    }

    let ink = binarize_otsu_inv(gray);
    let contours = find_contours::<u32>(&ink);

    let boxes: Vec<BBox> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let x_min = c.points.iter().map(|p| p.x).min()?;
            let x_max = c.points.iter().map(|p| p.x).max()?;
            let y_min = c.points.iter().map(|p| p.y).min()?;
            let y_max = c.points.iter().map(|p| p.y).max()?;
            Some(BBox::new(x_min, y_min, x_max - x_min + 1, y_max - y_min + 1))
        })
        .filter(|b| b.w >= config.min_word_size && b.h >= config.min_word_size)
        .collect();

    debug!(
        components = contours.len(),
        words = boxes.len(),
        "Word segmentation done"
    );
    Ok(boxes)
}
