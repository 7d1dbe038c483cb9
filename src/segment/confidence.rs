// Per-line ink density scores.

use image::GrayImage;
use image::imageops::crop_imm;
use tracing::instrument;

use super::lines::segment_lines;
use super::{BBox, ScoredBox, SegmentConfig};
use crate::error::Result;
use crate::preprocess::threshold::binarize_otsu_inv;

/// Line segmentation with a density score per line.
///
/// Each line crop is re-binarized with its own Otsu threshold, so the score
/// follows local contrast rather than the page-wide cut.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn segment_with_confidence(gray: &GrayImage, config: &SegmentConfig) -> Result<Vec<ScoredBox>> {
    let lines = segment_lines(gray, config)?;
    Ok(lines
        .into_iter()
        .map(|bbox| ScoredBox {
            bbox,
            confidence: ink_density(gray, &bbox),
        })
        .collect())
}

/// Fraction of ink pixels inside `bbox` after re-binarizing the crop.
pub fn ink_density(gray: &GrayImage, bbox: &BBox) -> f32 {
    if bbox.area() == 0 {
        return 0.0;
    }
    let crop = crop_imm(gray, bbox.x, bbox.y, bbox.w, bbox.h).to_image();
    let ink = binarize_otsu_inv(&crop);
    let count = ink.pixels().filter(|p| p.0[0] != 0).count() as u64;
    (count as f64 / bbox.area() as f64).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_half_inked_line() {
        // Alternating ink/paper columns inside the band: density 0.5.
        let img = GrayImage::from_fn(100, 40, |x, y| {
            if (10..30).contains(&y) && (10..90).contains(&x) && x % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let scored = segment_with_confidence(&img, &SegmentConfig::default()).unwrap();
        assert_eq!(scored.len(), 1);
        let s = scored[0];
        assert_eq!(s.bbox, BBox::new(10, 10, 79, 20));
        // 40 ink columns out of 79.
        assert!((s.confidence - 40.0 / 79.0).abs() < 1e-4, "{}", s.confidence);
    }

    #[test]
    fn test_solid_band_scores_one() {
        let img = GrayImage::from_fn(100, 40, |x, y| {
            if (10..30).contains(&y) && (10..90).contains(&x) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let scored = segment_with_confidence(&img, &SegmentConfig::default()).unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].confidence, 1.0);
    }

    #[test]
    fn test_scores_are_bounded() {
        let img = GrayImage::from_fn(120, 60, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        let config = SegmentConfig {
            min_row_sum: Some(0),
            min_line_height: 0,
            emit_open_band: true,
            ..SegmentConfig::default()
        };
        for s in segment_with_confidence(&img, &config).unwrap() {
            assert!((0.0..=1.0).contains(&s.confidence));
        }
    }
}
