use std::path::Path;

use serde::Deserialize;

use crate::preprocess::PipelineKind;
use crate::preprocess::color::DEFAULT_SCALE;
use crate::preprocess::threshold::{ThresholdMethod, ThresholdParams};
use crate::segment::SegmentConfig;

/// settings.yaml の全体。未指定のフィールドはデフォルト値になる。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub preprocess: PreprocessSettings,
    pub segment: SegmentConfig,
    /// バッチ処理のワーカースレッド数。0 なら rayon の既定値。
    pub parallel_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            preprocess: PreprocessSettings::default(),
            segment: SegmentConfig::default(),
            parallel_workers: 0,
        }
    }
}

/// 前処理パイプラインの設定。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    pub pipeline: PipelineKind,
    pub scale: f64,
    pub threshold_method: ThresholdMethod,
    pub block_size: u32,
    pub bias: i32,
    pub gamma: f64,
    pub auto_orient: bool,
    pub remove_borders: bool,
    pub enhance_contrast: bool,
    pub remove_background: bool,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        PreprocessSettings {
            pipeline: PipelineKind::Standard,
            scale: DEFAULT_SCALE,
            threshold_method: ThresholdMethod::Gaussian,
            block_size: 31,
            bias: 10,
            gamma: 1.0,
            auto_orient: false,
            remove_borders: false,
            enhance_contrast: false,
            remove_background: false,
        }
    }
}

impl PreprocessSettings {
    pub fn threshold_params(&self) -> ThresholdParams {
        ThresholdParams {
            method: self.threshold_method,
            block_size: self.block_size,
            bias: self.bias,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::DocSegError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
