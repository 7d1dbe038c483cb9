use super::job::{Job, SegmentMode};
use super::settings::{PreprocessSettings, Settings};
use crate::segment::SegmentConfig;

#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub mode: SegmentMode,
    pub preprocess: PreprocessSettings,
    pub segment: SegmentConfig,
    pub parallel_workers: usize,
}

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        let mut preprocess = settings.preprocess.clone();
        preprocess.pipeline = job.pipeline.unwrap_or(preprocess.pipeline);
        preprocess.scale = job.scale.unwrap_or(preprocess.scale);

        let base = &settings.segment;
        let segment = SegmentConfig {
            min_row_sum: job.min_row_sum.or(base.min_row_sum),
            min_line_height: job.min_line_height.unwrap_or(base.min_line_height),
            min_word_size: job.min_word_size.unwrap_or(base.min_word_size),
            emit_open_band: job.emit_open_band.unwrap_or(base.emit_open_band),
        };

        MergedConfig {
            mode: job.mode,
            preprocess,
            segment,
            parallel_workers: settings.parallel_workers,
        }
    }
}
