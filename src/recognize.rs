// Seams for the text recognizer and field extractor that sit downstream.

use std::collections::BTreeMap;

use image::GrayImage;
use image::imageops::crop_imm;

use crate::error::Result;
use crate::segment::{BBox, SegmentConfig, segment_lines};

/// Text read from one line image.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

/// An OCR engine that reads a single line image.
pub trait TextRecognizer: Sync {
    fn recognize(&self, line: &GrayImage) -> Result<Recognition>;
}

/// Pulls named fields (invoice number, date, total, ...) out of recognized text.
pub trait FieldExtractor {
    fn extract(&self, text: &str) -> BTreeMap<String, String>;
}

/// Segment `page` into lines and hand each line crop to `recognizer`,
/// top to bottom. The text is passed through untouched.
pub fn recognize_lines(
    page: &GrayImage,
    config: &SegmentConfig,
    recognizer: &dyn TextRecognizer,
) -> Result<Vec<(BBox, Recognition)>> {
    segment_lines(page, config)?
        .into_iter()
        .map(|bbox| {
            let line = crop_imm(page, bbox.x, bbox.y, bbox.w, bbox.h).to_image();
            recognizer.recognize(&line).map(|r| (bbox, r))
        })
        .collect()
}
