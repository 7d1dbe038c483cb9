use serde::{Deserialize, Serialize};

use crate::preprocess::PipelineKind;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

/// 出力するボックスの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMode {
    #[default]
    Lines,
    Words,
    Confidence,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    #[serde(deserialize_with = "deserialize_inputs")]
    pub input: Vec<String>,
    pub output: String,
    #[serde(default)]
    pub mode: SegmentMode,
    pub pipeline: Option<PipelineKind>,
    pub scale: Option<f64>,
    pub min_row_sum: Option<u32>,
    pub min_line_height: Option<u32>,
    pub min_word_size: Option<u32>,
    pub emit_open_band: Option<bool>,
}

/// 入力指定文字列を画像パスのベクタに変換する。
///
/// 形式:
/// - 単一ファイル: `"scan.png"`
/// - カンマ区切り: `"a.png, b.png"`
///
/// 空要素は無視する。順序は保持し、重複も残す（結果はスロット単位で対応する）。
pub fn parse_input_list(s: &str) -> crate::error::Result<Vec<String>> {
    let inputs: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();

    if inputs.is_empty() {
        return Err(crate::error::DocSegError::config(
            "Input list cannot be empty",
        ));
    }
    Ok(inputs)
}

/// serdeのdeserialize_withで使用する入力デシリアライザ（文字列またはリスト）
fn deserialize_inputs<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => parse_input_list(&s).map_err(serde::de::Error::custom),
        OneOrMany::Many(list) => {
            if list.is_empty() {
                Err(serde::de::Error::custom("Input list cannot be empty"))
            } else {
                Ok(list)
            }
        }
    }
}
