// Raw pixel buffers at the library boundary and their conversion to `image` types.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::{debug, instrument};

use crate::error::{DocSegError, Result};

/// An owned, row-major, 8-bit image buffer described by explicit dimensions.
///
/// `channels` is 1 (grayscale/binary) or 3 (RGB, interleaved). A buffer with
/// zero width or height is the empty image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<u8>,
}

impl RawImage {
    /// Wrap raw samples, validating the channel count and buffer length.
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Result<Self> {
        if channels != 1 && channels != 3 {
            return Err(DocSegError::invalid_argument(format!(
                "channel count must be 1 or 3, got {}",
                channels
            )));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|wh| wh.checked_mul(channels as usize))
            .ok_or_else(|| {
                DocSegError::invalid_argument(format!(
                    "Overflow computing buffer size for {}x{}x{} image",
                    width, height, channels
                ))
            })?;

        if data.len() != expected_len {
            return Err(DocSegError::invalid_argument(format!(
                "Data size mismatch: expected {} bytes, got {}",
                expected_len,
                data.len()
            )));
        }

        Ok(RawImage {
            width,
            height,
            channels,
            data,
        })
    }

    /// The canonical empty image (0x0, one channel).
    pub fn empty() -> Self {
        RawImage {
            width: 0,
            height: 0,
            channels: 1,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Copy a grayscale image into a single-channel raw buffer.
    pub fn from_gray(gray: &GrayImage) -> Self {
        RawImage {
            width: gray.width(),
            height: gray.height(),
            channels: 1,
            data: gray.as_raw().clone(),
        }
    }

    /// Take ownership of a grayscale image's samples without copying.
    pub fn from_gray_owned(gray: GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        RawImage {
            width,
            height,
            channels: 1,
            data: gray.into_raw(),
        }
    }

    /// Convert into an `image` crate image (Luma8 or Rgb8).
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8),
            _ => None,
        }
        .ok_or_else(|| {
            DocSegError::invalid_argument(format!(
                "buffer does not describe a {}x{}x{} image",
                self.width, self.height, self.channels
            ))
        })
    }

    /// Copy into a single-channel image, rejecting colour or empty input.
    ///
    /// This is the input contract of every segmentation routine.
    pub fn to_gray_strict(&self) -> Result<GrayImage> {
        if self.is_empty() {
            return Err(DocSegError::invalid_argument(format!(
                "empty image ({}x{})",
                self.width, self.height
            )));
        }
        if self.channels != 1 {
            return Err(DocSegError::invalid_argument(format!(
                "segmentation requires a single-channel image, got {} channels",
                self.channels
            )));
        }
        GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            DocSegError::invalid_argument(format!(
                "Data size mismatch: expected {} bytes, got {}",
                self.width as usize * self.height as usize,
                self.data.len()
            ))
        })
    }
}

/// Decode an image file from disk.
///
/// This is the only preprocessing step that fails hard: a missing or
/// undecodable file yields [`DocSegError::ImageDecode`].
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|err| {
        DocSegError::image_decode(format!("Failed to load image {}: {}", path.display(), err))
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DocSegError::image_decode(format!(
            "Image {} has no pixels",
            path.display()
        )));
    }
    debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "Loaded image"
    );
    Ok(image)
}
