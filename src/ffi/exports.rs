// C-callable entry points.
//
// Every function returns a `Status`. On failure all out-parameters hold their
// null/zero sentinel and `get_last_error` describes the cause. Every buffer
// handed out on success is owned by the caller and must be released with
// `free_buffer`.

use std::any::Any;
use std::ffi::{CStr, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

use tracing::{error, warn};

use super::buffer::ModuleBuffer;
use super::last_error::{
    clear_last_error, last_error_ptr, last_timing_ptr, set_last_error, set_last_timing,
};
use super::status::Status;
use crate::config::settings::PreprocessSettings;
use crate::error::{DocSegError, Result};
use crate::pipeline::batch::{BatchRunner, CancellationToken};
use crate::preprocess::{PipelineKind, preprocess_file};
use crate::raster::RawImage;
use crate::segment::{
    BBox, SegmentConfig, segment_lines_raw, segment_with_confidence_raw, segment_words_raw,
};

/// One line box with its ink density.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBoxC {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub confidence: f32,
}

/// Borrowed description of one caller-owned image for `segment_batch`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageView {
    pub data: *const u8,
    pub width: i32,
    pub height: i32,
    pub channels: i32,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `f`, translating errors and panics into a status code plus the
/// thread-local message.
fn guarded(op: &'static str, f: impl FnOnce() -> Result<()>) -> Status {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {
            clear_last_error();
            Status::Success
        }
        Ok(Err(e)) => {
            warn!(op, error = %e, "Call failed");
            set_last_error(&format!("{op}: {e}"));
            e.status()
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(op, panic = %msg, "Panic caught at ABI boundary");
            set_last_error(&format!("{op}: internal panic: {msg}"));
            Status::Unknown
        }
    }
}

/// Copy a caller buffer into an owned [`RawImage`].
///
/// # Safety
/// When non-null, `data` must point to `width * height * channels` readable bytes.
unsafe fn raw_image(data: *const u8, width: i32, height: i32, channels: i32) -> Result<RawImage> {
    if data.is_null() {
        return Err(DocSegError::invalid_argument("image buffer is null"));
    }
    if width <= 0 || height <= 0 {
        return Err(DocSegError::invalid_argument(format!(
            "image dimensions must be positive, got {width}x{height}"
        )));
    }
    if channels != 1 && channels != 3 {
        return Err(DocSegError::invalid_argument(format!(
            "channel count must be 1 or 3, got {channels}"
        )));
    }
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|wh| wh.checked_mul(channels as usize))
        .ok_or_else(|| DocSegError::invalid_argument("image size overflows"))?;

    let samples = unsafe { std::slice::from_raw_parts(data, len) };
    RawImage::new(width as u32, height as u32, channels as u32, samples.to_vec())
}

fn flatten_boxes(boxes: &[BBox]) -> Vec<i32> {
    boxes
        .iter()
        .flat_map(|b| [b.x as i32, b.y as i32, b.w as i32, b.h as i32])
        .collect()
}

/// # Safety
/// `path` must be a NUL-terminated string; every out pointer must be valid for writes.
unsafe fn preprocess_with(
    op: &'static str,
    pipeline: PipelineKind,
    path: *const c_char,
    out_width: *mut i32,
    out_height: *mut i32,
    out_channels: *mut i32,
    out_buffer: *mut *mut u8,
) -> Status {
    guarded(op, || {
        if out_width.is_null()
            || out_height.is_null()
            || out_channels.is_null()
            || out_buffer.is_null()
        {
            return Err(DocSegError::invalid_argument("output pointer is null"));
        }
        unsafe {
            *out_width = 0;
            *out_height = 0;
            *out_channels = 0;
            *out_buffer = ptr::null_mut();
        }
        if path.is_null() {
            return Err(DocSegError::invalid_argument("path is null"));
        }
        let path = unsafe { CStr::from_ptr(path) }
            .to_str()
            .map_err(|_| DocSegError::invalid_argument("path is not valid UTF-8"))?;

        let settings = PreprocessSettings {
            pipeline,
            ..PreprocessSettings::default()
        };
        let timed = preprocess_file(Path::new(path), &settings)?;
        set_last_timing(&timed.summary());

        let page = timed.value;
        let (width, height) = page.dimensions();
        if width == 0 || height == 0 {
            return Err(DocSegError::algorithm("pipeline produced an empty image"));
        }
        let buffer = ModuleBuffer::from_slice(page.as_raw())?;

        unsafe {
            *out_width = width as i32;
            *out_height = height as i32;
            *out_channels = 1;
            *out_buffer = buffer.into_raw();
        }
        Ok(())
    })
}

/// Load an image file and run the standard pipeline (grayscale, 1.5x resize,
/// adaptive threshold, deskew). The result is a single-channel binary image.
///
/// # Safety
/// - `path` must be null or a valid NUL-terminated UTF-8 string
/// - every out pointer must be valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn preprocess_image(
    path: *const c_char,
    out_width: *mut i32,
    out_height: *mut i32,
    out_channels: *mut i32,
    out_buffer: *mut *mut u8,
) -> Status {
    unsafe {
        preprocess_with(
            "preprocess_image",
            PipelineKind::Standard,
            path,
            out_width,
            out_height,
            out_channels,
            out_buffer,
        )
    }
}

/// Same as [`preprocess_image`] with the enhanced pipeline (denoise and dewarp).
///
/// # Safety
/// Same contract as [`preprocess_image`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn preprocess_image_enhanced(
    path: *const c_char,
    out_width: *mut i32,
    out_height: *mut i32,
    out_channels: *mut i32,
    out_buffer: *mut *mut u8,
) -> Status {
    unsafe {
        preprocess_with(
            "preprocess_image_enhanced",
            PipelineKind::Enhanced,
            path,
            out_width,
            out_height,
            out_channels,
            out_buffer,
        )
    }
}

/// # Safety
/// See [`segment_lines`].
#[allow(clippy::too_many_arguments)]
unsafe fn segment_plain(
    op: &'static str,
    segment: fn(&RawImage, &SegmentConfig) -> Result<Vec<BBox>>,
    data: *const u8,
    width: i32,
    height: i32,
    channels: i32,
    out_boxes: *mut *mut i32,
    out_count: *mut usize,
) -> Status {
    guarded(op, || {
        if out_boxes.is_null() || out_count.is_null() {
            return Err(DocSegError::invalid_argument("output pointer is null"));
        }
        unsafe {
            *out_boxes = ptr::null_mut();
            *out_count = 0;
        }
        let image = unsafe { raw_image(data, width, height, channels) }?;
        let boxes = segment(&image, &SegmentConfig::default())?;
        let buffer = ModuleBuffer::from_slice(&flatten_boxes(&boxes))?;

        unsafe {
            *out_boxes = buffer.into_raw();
            *out_count = boxes.len();
        }
        Ok(())
    })
}

/// Detect text lines. `out_boxes` receives `4 * out_count` integers laid out
/// as `x, y, w, h` per box.
///
/// # Safety
/// - `data` must be null or point to `width * height * channels` readable bytes
/// - `out_boxes` and `out_count` must be valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segment_lines(
    data: *const u8,
    width: i32,
    height: i32,
    channels: i32,
    out_boxes: *mut *mut i32,
    out_count: *mut usize,
) -> Status {
    unsafe {
        segment_plain(
            "segment_lines",
            segment_lines_raw,
            data,
            width,
            height,
            channels,
            out_boxes,
            out_count,
        )
    }
}

/// Detect word blobs. Same buffer layout as [`segment_lines`].
///
/// # Safety
/// Same contract as [`segment_lines`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segment_words(
    data: *const u8,
    width: i32,
    height: i32,
    channels: i32,
    out_boxes: *mut *mut i32,
    out_count: *mut usize,
) -> Status {
    unsafe {
        segment_plain(
            "segment_words",
            segment_words_raw,
            data,
            width,
            height,
            channels,
            out_boxes,
            out_count,
        )
    }
}

/// Detect text lines and score each by ink density. `out_boxes` receives
/// `out_count` [`ScoredBoxC`] records.
///
/// # Safety
/// Same contract as [`segment_lines`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segment_with_confidence(
    data: *const u8,
    width: i32,
    height: i32,
    channels: i32,
    out_boxes: *mut *mut ScoredBoxC,
    out_count: *mut usize,
) -> Status {
    guarded("segment_with_confidence", || {
        if out_boxes.is_null() || out_count.is_null() {
            return Err(DocSegError::invalid_argument("output pointer is null"));
        }
        unsafe {
            *out_boxes = ptr::null_mut();
            *out_count = 0;
        }
        let image = unsafe { raw_image(data, width, height, channels) }?;
        let scored = segment_with_confidence_raw(&image, &SegmentConfig::default())?;
        let records: Vec<ScoredBoxC> = scored
            .iter()
            .map(|s| ScoredBoxC {
                x: s.bbox.x as i32,
                y: s.bbox.y as i32,
                w: s.bbox.w as i32,
                h: s.bbox.h as i32,
                confidence: s.confidence,
            })
            .collect();
        let buffer = ModuleBuffer::from_slice(&records)?;

        unsafe {
            *out_boxes = buffer.into_raw();
            *out_count = records.len();
        }
        Ok(())
    })
}

/// Line segmentation of `count` images in parallel.
///
/// On success the three out arrays each have `count` entries and slot `i`
/// belongs to `images[i]`: either `out_boxes[i]` holds `4 * out_counts[i]`
/// integers and `out_errors[i]` is null, or `out_boxes[i]` is null,
/// `out_counts[i]` is 0 and `out_errors[i]` is a NUL-terminated message.
/// A failing slot does not fail the call. The outer arrays and every non-null
/// inner pointer must each be released with `free_buffer`. The wall time of
/// the batch is available from `get_last_timing`.
///
/// # Safety
/// - `images` must point to `count` valid [`ImageView`]s (may be null when `count` is 0)
/// - each view's `data` must be null or cover `width * height * channels` bytes
/// - the three out pointers must be valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segment_batch(
    images: *const ImageView,
    count: usize,
    out_boxes: *mut *mut *mut i32,
    out_counts: *mut *mut usize,
    out_errors: *mut *mut *mut c_char,
) -> Status {
    guarded("segment_batch", || {
        if out_boxes.is_null() || out_counts.is_null() || out_errors.is_null() {
            return Err(DocSegError::invalid_argument("output pointer is null"));
        }
        unsafe {
            *out_boxes = ptr::null_mut();
            *out_counts = ptr::null_mut();
            *out_errors = ptr::null_mut();
        }
        if images.is_null() && count > 0 {
            return Err(DocSegError::invalid_argument("image array is null"));
        }
        let views: &[ImageView] = if count == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(images, count) }
        };

        // Copy on the calling thread; the workers only see owned buffers.
        // `slots[i]` is `Ok(())` when view `i` became the next entry of `valid`.
        let mut valid: Vec<RawImage> = Vec::with_capacity(count);
        let mut slots: Vec<Result<()>> = Vec::with_capacity(count);
        for v in views {
            match unsafe { raw_image(v.data, v.width, v.height, v.channels) } {
                Ok(image) => {
                    valid.push(image);
                    slots.push(Ok(()));
                }
                Err(e) => slots.push(Err(e)),
            }
        }

        let mut report = BatchRunner::default().segment_batch(
            &valid,
            &SegmentConfig::default(),
            &CancellationToken::new(),
        );
        let mut segmented = std::mem::take(&mut report.results).into_iter();
        report.results = slots
            .into_iter()
            .map(|slot| {
                slot.and_then(|()| {
                    segmented
                        .next()
                        .unwrap_or_else(|| Err(DocSegError::algorithm("batch result missing")))
                })
            })
            .collect();

        let mut box_bufs: Vec<Option<ModuleBuffer<i32>>> = Vec::with_capacity(count);
        let mut err_bufs: Vec<Option<ModuleBuffer<c_char>>> = Vec::with_capacity(count);
        let mut counts: Vec<usize> = Vec::with_capacity(count);
        for result in &report.results {
            match result {
                Ok(boxes) => {
                    box_bufs.push(Some(ModuleBuffer::from_slice(&flatten_boxes(boxes))?));
                    err_bufs.push(None);
                    counts.push(boxes.len());
                }
                Err(e) => {
                    box_bufs.push(None);
                    err_bufs.push(Some(ModuleBuffer::c_string(&e.to_string())?));
                    counts.push(0);
                }
            }
        }

        let box_ptrs: Vec<*mut i32> = box_bufs
            .iter()
            .map(|b| b.as_ref().map_or(ptr::null_mut(), |b| b.as_ptr().cast_mut()))
            .collect();
        let err_ptrs: Vec<*mut c_char> = err_bufs
            .iter()
            .map(|e| e.as_ref().map_or(ptr::null_mut(), |e| e.as_ptr().cast_mut()))
            .collect();
        let outer_boxes = ModuleBuffer::from_slice(&box_ptrs)?;
        let outer_counts = ModuleBuffer::from_slice(&counts)?;
        let outer_errors = ModuleBuffer::from_slice(&err_ptrs)?;

        // Every allocation succeeded; hand everything over.
        for buf in box_bufs.into_iter().flatten() {
            let _ = buf.into_raw();
        }
        for buf in err_bufs.into_iter().flatten() {
            let _ = buf.into_raw();
        }
        unsafe {
            *out_boxes = outer_boxes.into_raw();
            *out_counts = outer_counts.into_raw();
            *out_errors = outer_errors.into_raw();
        }
        set_last_timing(&report.timing_summary());
        Ok(())
    })
}

/// Release a buffer returned by any function in this module. Null is a no-op.
///
/// # Safety
/// `ptr` must be null or a pointer handed out by this module that has not
/// been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_buffer(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    unsafe { libc::free(ptr) }
}

/// The last error message on the calling thread, or an empty string.
///
/// The string is owned by the module and stays valid until the next call on
/// the same thread. Do not free it.
#[unsafe(no_mangle)]
pub extern "C" fn get_last_error() -> *const c_char {
    last_error_ptr()
}

/// Timing of the last preprocessing or batch call on the calling thread, or
/// an empty string. Same lifetime rules as [`get_last_error`].
#[unsafe(no_mangle)]
pub extern "C" fn get_last_timing() -> *const c_char {
    last_timing_ptr()
}
