// Order-preserving parallel map over a batch of images.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, instrument};

use crate::error::{DocSegError, Result};
use crate::raster::RawImage;
use crate::segment::{BBox, SegmentConfig, segment_lines_raw};

/// Shared flag that stops a batch from starting further work.
///
/// Units already running finish normally; units that start after
/// [`cancel`](Self::cancel) resolve to [`DocSegError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-image segmentation results of one batch, indexed like the input.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<Result<Vec<BBox>>>,
    pub elapsed: Duration,
}

impl BatchReport {
    /// `"segment_batch: <n> images in <ms> ms"`
    pub fn timing_summary(&self) -> String {
        format!(
            "segment_batch: {} images in {} ms",
            self.results.len(),
            self.elapsed.as_millis()
        )
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }
}

/// Runs independent units of work on a fixed set of worker threads.
///
/// `BatchRunner::default()` (or `new(0)`) uses rayon's global pool.
#[derive(Default)]
pub struct BatchRunner {
    pool: Option<ThreadPool>,
}

impl BatchRunner {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Ok(Self::default());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("docseg-worker-{i}"))
            .build()
            .map_err(|e| DocSegError::allocation(format!("Failed to build thread pool: {e}")))?;
        Ok(BatchRunner { pool: Some(pool) })
    }

    pub fn workers(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Apply `f` to every item in parallel. `results[i]` always belongs to
    /// `items[i]`; each unit writes only its own pre-allocated slot.
    pub fn map<T, R, F>(&self, items: &[T], cancel: &CancellationToken, f: F) -> Vec<Result<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let mut slots: Vec<Option<Result<R>>> = Vec::with_capacity(items.len());
        slots.resize_with(items.len(), || None);

        let mut fill = || {
            slots
                .par_iter_mut()
                .zip(items.par_iter())
                .for_each(|(slot, item)| {
                    *slot = Some(if cancel.is_cancelled() {
                        Err(DocSegError::cancelled("batch cancelled before this image started"))
                    } else {
                        f(item)
                    });
                });
        };
        match &self.pool {
            Some(pool) => pool.install(fill),
            None => fill(),
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(DocSegError::algorithm("batch slot was not filled")))
            })
            .collect()
    }

    /// Line segmentation of every image.
    #[instrument(skip_all, fields(images = images.len(), workers = self.workers()))]
    pub fn segment_batch(
        &self,
        images: &[RawImage],
        config: &SegmentConfig,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let start = Instant::now();
        let results = self.map(images, cancel, |image| segment_lines_raw(image, config));
        let report = BatchReport {
            results,
            elapsed: start.elapsed(),
        };
        info!(
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Batch complete"
        );
        report
    }
}

/// Line segmentation of every image on rayon's global pool.
pub fn segment_batch(images: &[RawImage], config: &SegmentConfig) -> BatchReport {
    BatchRunner::default().segment_batch(images, config, &CancellationToken::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn page_with_bands(bands: &[(u32, u32)]) -> RawImage {
        let gray = GrayImage::from_fn(200, 100, |x, y| {
            let inked = bands.iter().any(|&(top, bottom)| (top..bottom).contains(&y));
            if inked && (20..180).contains(&x) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        RawImage::from_gray_owned(gray)
    }

    #[test]
    fn test_results_follow_input_order() {
        let images = vec![
            page_with_bands(&[(10, 26), (60, 81)]),
            RawImage::empty(),
            page_with_bands(&[(40, 60)]),
        ];
        let runner = BatchRunner::new(3).unwrap();
        let report =
            runner.segment_batch(&images, &SegmentConfig::default(), &CancellationToken::new());

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].as_ref().unwrap().len(), 2);
        assert!(matches!(report.results[1], Err(DocSegError::InvalidArgument(_))));
        assert_eq!(report.results[2].as_ref().unwrap().len(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_order_preserved_for_many_images() {
        // Image i has (i % 3) + 1 bands.
        let layouts: [&[(u32, u32)]; 3] = [
            &[(10, 30)],
            &[(10, 30), (50, 70)],
            &[(5, 20), (35, 50), (65, 80)],
        ];
        let images: Vec<RawImage> = (0..24).map(|i| page_with_bands(layouts[i % 3])).collect();

        let report = BatchRunner::new(4)
            .unwrap()
            .segment_batch(&images, &SegmentConfig::default(), &CancellationToken::new());
        for (i, result) in report.results.iter().enumerate() {
            assert_eq!(result.as_ref().unwrap().len(), i % 3 + 1, "slot {i}");
        }
    }

    #[test]
    fn test_cancelled_batch_starts_nothing() {
        let images = vec![page_with_bands(&[(10, 30)]); 5];
        let cancel = CancellationToken::new();
        cancel.clone().cancel();

        let report =
            BatchRunner::default().segment_batch(&images, &SegmentConfig::default(), &cancel);
        assert_eq!(report.results.len(), 5);
        assert!(report.results.iter().all(|r| matches!(r, Err(DocSegError::Cancelled(_)))));
    }

    #[test]
    fn test_map_with_fixed_pool_runs_on_workers() {
        let runner = BatchRunner::new(2).unwrap();
        assert_eq!(runner.workers(), 2);
        let names = runner.map(&[0u8; 4], &CancellationToken::new(), |_| {
            Ok(std::thread::current().name().unwrap_or_default().to_string())
        });
        for name in names {
            assert!(name.unwrap().starts_with("docseg-worker-"));
        }
    }

    #[test]
    fn test_empty_batch() {
        let report = segment_batch(&[], &SegmentConfig::default());
        assert!(report.results.is_empty());
        assert!(report.timing_summary().starts_with("segment_batch: 0 images in "));
    }

    #[test]
    fn test_timing_summary_format() {
        let report = BatchReport {
            results: vec![Ok(Vec::new()), Ok(Vec::new())],
            elapsed: Duration::from_millis(7),
        };
        assert_eq!(report.timing_summary(), "segment_batch: 2 images in 7 ms");
    }
}
