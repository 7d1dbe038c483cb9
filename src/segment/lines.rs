// Line segmentation from the horizontal projection profile.

use std::ops::Range;

use image::GrayImage;
use tracing::{debug, instrument};

use super::{BBox, SegmentConfig};
use crate::error::{DocSegError, Result};
use crate::preprocess::threshold::binarize_otsu_inv;

/// Ink count per row of a foreground (nonzero = ink) image.
pub fn projection_profile(ink: &GrayImage) -> Vec<u32> {
    ink.rows()
        .map(|row| row.filter(|p| p.0[0] != 0).count() as u32)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    OutsideLine,
    InsideLine { start: u32 },
}

/// Two-state scanner over a projection profile.
///
/// Enters a line when a row's count exceeds the threshold, leaves it when the
/// count falls back to or below it and records the closed band.
#[derive(Debug)]
pub struct LineScanner {
    threshold: u32,
    state: ScanState,
    bands: Vec<Range<u32>>,
}

impl LineScanner {
    pub fn new(threshold: u32) -> Self {
        LineScanner {
            threshold,
            state: ScanState::OutsideLine,
            bands: Vec::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feed row `y` with its ink count. Rows must arrive in order.
    pub fn feed(&mut self, y: u32, count: u32) {
        match self.state {
            ScanState::OutsideLine if count > self.threshold => {
                self.state = ScanState::InsideLine { start: y };
            }
            ScanState::InsideLine { start } if count <= self.threshold => {
                self.bands.push(start..y);
                self.state = ScanState::OutsideLine;
            }
            _ => {}
        }
    }

    /// Finish the scan at `end` (one past the last row). A band still open is
    /// dropped unless `emit_open_band` is set.
    pub fn finish(mut self, end: u32, emit_open_band: bool) -> Vec<Range<u32>> {
        if let ScanState::InsideLine { start } = self.state {
            if emit_open_band {
                self.bands.push(start..end);
            } else {
                debug!(start, "Dropping band open at the last row");
            }
        }
        self.bands
    }
}

/// Row bands of a projection profile.
pub fn line_bands(profile: &[u32], threshold: u32, emit_open_band: bool) -> Vec<Range<u32>> {
    let mut scanner = LineScanner::new(threshold);
    for (y, &count) in profile.iter().enumerate() {
        scanner.feed(y as u32, count);
    }
    scanner.finish(profile.len() as u32, emit_open_band)
}

/// Segment a grayscale page into text line boxes.
///
/// The page is binarized with inverted Otsu, rows are grouped into bands by
/// [`line_bands`], bands not taller than `min_line_height` are discarded and
/// each remaining band is tightened to the horizontal extent of its ink.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn segment_lines(gray: &GrayImage, config: &SegmentConfig) -> Result<Vec<BBox>> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(DocSegError::invalid_argument(format!(
            "empty image ({}x{})",
            width, height
        )));
    }

    let ink = binarize_otsu_inv(gray);
    let profile = projection_profile(&ink);
    let threshold = config.row_threshold(width);
    let bands = line_bands(&profile, threshold, config.emit_open_band);

    let mut boxes = Vec::new();
    for band in bands {
        if band.end - band.start <= config.min_line_height {
            continue;
        }

        let mut x_min = width;
        let mut x_max = 0;
        for y in band.clone() {
            for x in 0..width {
                if ink.get_pixel(x, y).0[0] != 0 {
                    x_min = x_min.min(x);
                    x_max = x_max.max(x);
                }
            }
        }
        // Page-edge bands can pass the row test without a usable extent.
        if x_max <= x_min {
            continue;
        }

        boxes.push(BBox::new(
            x_min,
            band.start,
            x_max - x_min + 1,
            band.end - band.start,
        ));
    }

    debug!(threshold, lines = boxes.len(), "Line segmentation done");
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn page(width: u32, height: u32, bands: &[(Range<u32>, Range<u32>)]) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if bands.iter().any(|(rows, cols)| rows.contains(&y) && cols.contains(&x)) {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_scanner_transitions() {
        let mut scanner = LineScanner::new(2);
        scanner.feed(0, 0);
        assert_eq!(scanner.state(), ScanState::OutsideLine);
        scanner.feed(1, 3);
        assert_eq!(scanner.state(), ScanState::InsideLine { start: 1 });
        scanner.feed(2, 2);
        assert_eq!(scanner.state(), ScanState::OutsideLine);
        assert_eq!(scanner.finish(3, false), vec![1..2]);
    }

    #[test]
    fn test_open_band_policy() {
        let profile = [0, 5, 5, 0, 5, 5];
        assert_eq!(line_bands(&profile, 1, false), vec![1..3]);
        assert_eq!(line_bands(&profile, 1, true), vec![1..3, 4..6]);
    }

    #[test]
    fn test_projection_profile_counts_nonzero() {
        let ink = GrayImage::from_fn(4, 2, |x, y| {
            if y == 1 && x < 3 { Luma([255]) } else { Luma([0]) }
        });
        assert_eq!(projection_profile(&ink), vec![0, 3]);
    }

    #[test]
    fn test_two_bands() {
        let img = page(200, 100, &[(10..26, 20..181), (60..81, 20..181)]);
        let boxes = segment_lines(&img, &SegmentConfig::default()).unwrap();
        assert_eq!(boxes, vec![BBox::new(20, 10, 161, 16), BBox::new(20, 60, 161, 21)]);
    }

    #[test]
    fn test_short_band_is_dropped() {
        let img = page(200, 100, &[(10..18, 20..181), (60..81, 20..181)]);
        let boxes = segment_lines(&img, &SegmentConfig::default()).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].y, 60);
    }

    #[test]
    fn test_band_touching_bottom_depends_on_policy() {
        let img = page(200, 100, &[(10..26, 20..181), (80..100, 20..181)]);

        let closed_only = segment_lines(&img, &SegmentConfig::default()).unwrap();
        assert_eq!(closed_only.len(), 1);

        let config = SegmentConfig {
            emit_open_band: true,
            ..SegmentConfig::default()
        };
        let with_open = segment_lines(&img, &config).unwrap();
        assert_eq!(with_open.len(), 2);
        assert_eq!(with_open[1], BBox::new(20, 80, 161, 20));
        assert!(with_open.iter().all(|b| b.fits_within(200, 100)));
    }

    #[test]
    fn test_single_column_band_is_dropped() {
        let config = SegmentConfig {
            min_row_sum: Some(0),
            ..SegmentConfig::default()
        };
        let img = page(50, 40, &[(5..30, 10..11)]);
        assert!(segment_lines(&img, &config).unwrap().is_empty());
    }

    #[test]
    fn test_blank_page_has_no_lines() {
        let img = GrayImage::from_pixel(50, 50, Luma([255]));
        assert!(segment_lines(&img, &SegmentConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_image_is_rejected() {
        assert!(segment_lines(&GrayImage::new(0, 10), &SegmentConfig::default()).is_err());
    }
}
