// Image-to-image normalisation ahead of segmentation.

pub mod cleanup;
pub mod color;
pub mod deskew;
pub mod geometry;
pub mod threshold;

use std::path::Path;
use std::time::{Duration, Instant};

use image::imageops::invert;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

pub use cleanup::{denoise, enhance_contrast, remove_background, remove_borders};
pub use color::{resize, to_grayscale};
pub use deskew::{deskew, estimate_skew_angle};
pub use geometry::{auto_orient, dewarp};
pub use threshold::{ThresholdMethod, ThresholdParams, adaptive_threshold};

use crate::config::settings::PreprocessSettings;
use crate::error::Result;
use crate::raster::load_image;

/// Zero width or zero height: the "nothing to do" image.
pub(crate) fn is_empty(gray: &GrayImage) -> bool {
    gray.width() == 0 || gray.height() == 0
}

/// Which preprocessing chain to run before segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    #[default]
    Standard,
    Enhanced,
    /// Grayscale conversion only.
    None,
}

/// A value together with the wall time it took to produce.
#[derive(Debug, Clone)]
pub struct Timed<T> {
    pub stage: &'static str,
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    fn measure(stage: &'static str, f: impl FnOnce() -> T) -> Self {
        let start = Instant::now();
        let value = f();
        Timed {
            stage,
            value,
            elapsed: start.elapsed(),
        }
    }

    /// `"<stage>: <ms> ms"`
    pub fn summary(&self) -> String {
        format!("{}: {} ms", self.stage, self.elapsed.as_millis())
    }
}

/// Deskew a binary page whose ink is 0: the skew estimate wants ink as the
/// nonzero foreground, so the page is inverted around the rotation.
fn deskew_page(binary: &GrayImage) -> GrayImage {
    let mut inverted = binary.clone();
    invert(&mut inverted);
    let mut straightened = deskew(&inverted);
    invert(&mut straightened);
    straightened
}

/// grayscale → [auto_orient] → resize → adaptive threshold → deskew.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn standard_pipeline(image: &DynamicImage, settings: &PreprocessSettings) -> Timed<GrayImage> {
    Timed::measure("standard_pipeline", || {
        let mut gray = to_grayscale(image);
        if settings.auto_orient {
            gray = auto_orient(&gray);
        }
        let scaled = resize(&gray, settings.scale);
        let binary = adaptive_threshold(&scaled, &settings.threshold_params());
        deskew_page(&binary)
    })
}

/// grayscale → [remove_borders] → [enhance_contrast] → resize → denoise →
/// adaptive threshold (or background removal) → deskew → dewarp.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn enhanced_pipeline(image: &DynamicImage, settings: &PreprocessSettings) -> Timed<GrayImage> {
    Timed::measure("enhanced_pipeline", || {
        let mut gray = to_grayscale(image);
        if settings.remove_borders {
            gray = remove_borders(&gray);
        }
        if settings.enhance_contrast {
            gray = enhance_contrast(&gray, settings.gamma);
        }
        let scaled = resize(&gray, settings.scale);
        let smooth = denoise(&scaled);
        let binary = if settings.remove_background {
            remove_background(&smooth)
        } else {
            adaptive_threshold(&smooth, &settings.threshold_params())
        };
        let straightened = deskew_page(&binary);
        dewarp(&straightened)
    })
}

/// Run the chain selected by `settings.pipeline`.
pub fn run_pipeline(image: &DynamicImage, settings: &PreprocessSettings) -> Timed<GrayImage> {
    match settings.pipeline {
        PipelineKind::Standard => standard_pipeline(image, settings),
        PipelineKind::Enhanced => enhanced_pipeline(image, settings),
        PipelineKind::None => Timed::measure("grayscale", || to_grayscale(image)),
    }
}

/// Load an image file and run the configured pipeline on it.
pub fn preprocess_file(path: &Path, settings: &PreprocessSettings) -> Result<Timed<GrayImage>> {
    let image = load_image(path)?;
    let out = run_pipeline(&image, settings);
    info!(
        path = %path.display(),
        width = out.value.width(),
        height = out.value.height(),
        elapsed_ms = out.elapsed.as_millis() as u64,
        "Preprocessed"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn page() -> DynamicImage {
        let gray = GrayImage::from_fn(120, 80, |x, y| {
            if (20..28).contains(&y) && (10..110).contains(&x) {
                Luma([20])
            } else {
                Luma([235])
            }
        });
        DynamicImage::ImageLuma8(gray)
    }

    #[test]
    fn test_standard_pipeline_scales_and_binarizes() {
        let out = standard_pipeline(&page(), &PreprocessSettings::default()).value;
        assert_eq!(out.dimensions(), (180, 120));
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        // The ink band survives as ink (0).
        assert!(out.pixels().any(|p| p.0[0] == 0));
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_enhanced_pipeline_keeps_ink() {
        let settings = PreprocessSettings {
            pipeline: PipelineKind::Enhanced,
            scale: 1.0,
            ..PreprocessSettings::default()
        };
        let out = run_pipeline(&page(), &settings);
        assert_eq!(out.stage, "enhanced_pipeline");
        assert!(!is_empty(&out.value));
        assert!(out.value.pixels().any(|p| p.0[0] == 0));
    }

    #[test]
    fn test_none_pipeline_is_grayscale_only() {
        let settings = PreprocessSettings {
            pipeline: PipelineKind::None,
            ..PreprocessSettings::default()
        };
        let out = run_pipeline(&page(), &settings).value;
        assert_eq!(out, page().to_luma8());
    }

    #[test]
    fn test_empty_image_yields_empty_output() {
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        for pipeline in [PipelineKind::Standard, PipelineKind::Enhanced, PipelineKind::None] {
            let settings = PreprocessSettings {
                pipeline,
                ..PreprocessSettings::default()
            };
            assert!(is_empty(&run_pipeline(&empty, &settings).value));
        }
    }

    #[test]
    fn test_timed_summary_format() {
        let timed = Timed {
            stage: "standard_pipeline",
            value: (),
            elapsed: Duration::from_millis(42),
        };
        assert_eq!(timed.summary(), "standard_pipeline: 42 ms");
    }

    #[test]
    fn test_preprocess_file_missing_path() {
        let err =
            preprocess_file(Path::new("/nonexistent/scan.png"), &PreprocessSettings::default())
                .unwrap_err();
        assert!(matches!(err, crate::error::DocSegError::ImageDecode(_)));
    }

    #[test]
    fn test_preprocess_file_reads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        page().save(&path).unwrap();

        let out = preprocess_file(&path, &PreprocessSettings::default()).unwrap();
        assert_eq!(out.value.dimensions(), (180, 120));
    }
}
