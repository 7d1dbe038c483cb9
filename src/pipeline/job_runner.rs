// ジョブ単位: 画像読込 -> 並列前処理+セグメンテーション -> JSON出力

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::job::SegmentMode;
use crate::config::settings::PreprocessSettings;
use crate::pipeline::batch::{BatchRunner, CancellationToken};
use crate::preprocess::preprocess_file;
use crate::segment::{
    BBox, ScoredBox, SegmentConfig, segment_lines, segment_with_confidence, segment_words,
};

/// Configuration for a single job.
pub struct JobConfig {
    pub input_paths: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub mode: SegmentMode,
    pub preprocess: PreprocessSettings,
    pub segment: SegmentConfig,
    pub parallel_workers: usize,
}

/// Result of processing a single job.
pub struct JobResult {
    pub output_path: PathBuf,
    pub images_processed: usize,
    pub boxes_found: usize,
    /// `(input, message)` for every image that failed.
    pub failures: Vec<(PathBuf, String)>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Boxes {
    Plain(Vec<BBox>),
    Scored(Vec<ScoredBox>),
}

impl Boxes {
    fn len(&self) -> usize {
        match self {
            Boxes::Plain(b) => b.len(),
            Boxes::Scored(b) => b.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageOutput {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boxes: Option<Boxes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobOutput {
    mode: SegmentMode,
    images: Vec<ImageOutput>,
}

struct Segmented {
    width: u32,
    height: u32,
    elapsed_ms: u64,
    boxes: Boxes,
}

/// Run a single job: every input image is preprocessed and segmented on the
/// batch pool, then all results are written to one JSON file in input order.
///
/// A failing image is recorded in the output and in `JobResult::failures`;
/// it does not abort the other images.
#[instrument(
    skip_all,
    fields(output = %config.output_path.display(), images = config.input_paths.len())
)]
pub fn run_job(config: &JobConfig) -> crate::error::Result<JobResult> {
    let runner = BatchRunner::new(config.parallel_workers)?;
    let cancel = CancellationToken::new();

    let results = runner.map(&config.input_paths, &cancel, |path| {
        let timed = preprocess_file(path, &config.preprocess)?;
        let page = &timed.value;
        let boxes = match config.mode {
            SegmentMode::Lines => Boxes::Plain(segment_lines(page, &config.segment)?),
            SegmentMode::Words => Boxes::Plain(segment_words(page, &config.segment)?),
            SegmentMode::Confidence => {
                Boxes::Scored(segment_with_confidence(page, &config.segment)?)
            }
        };
        Ok(Segmented {
            width: page.width(),
            height: page.height(),
            elapsed_ms: timed.elapsed.as_millis() as u64,
            boxes,
        })
    });

    let mut images = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    let mut boxes_found = 0;
    for (path, result) in config.input_paths.iter().zip(results) {
        let input = path.display().to_string();
        match result {
            Ok(seg) => {
                boxes_found += seg.boxes.len();
                images.push(ImageOutput {
                    input,
                    width: Some(seg.width),
                    height: Some(seg.height),
                    elapsed_ms: Some(seg.elapsed_ms),
                    boxes: Some(seg.boxes),
                    error: None,
                });
            }
            Err(e) => {
                warn!(input = %input, error = %e, "Image failed");
                failures.push((path.clone(), e.to_string()));
                images.push(ImageOutput {
                    input,
                    width: None,
                    height: None,
                    elapsed_ms: None,
                    boxes: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let output = JobOutput {
        mode: config.mode,
        images,
    };
    let json = serde_json::to_string_pretty(&output)?;
    std::fs::write(&config.output_path, json)?;

    info!(boxes_found, failed = failures.len(), "Job complete");
    Ok(JobResult {
        output_path: config.output_path.clone(),
        images_processed: config.input_paths.len(),
        boxes_found,
        failures,
    })
}
