// 该文件是 Jiuhu （救护） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use chrono::Utc;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{InvalidMinScore, Render, min_score_param},
  relevance::DetectionList,
  url_path,
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error(transparent)]
  InvalidMinScore(#[from] InvalidMinScore),
  #[error("输出锁已损坏")]
  Poisoned,
}

/// 每帧写一行 JSON。路径为空时写到标准输出。
///
/// 分数保留 6 位小数。
pub struct JsonLinesOutput {
  writer: Mutex<Box<dyn Write + Send>>,
  min_score: f32,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    let min_score = min_score_param(url)?;
    let path = url_path(url);
    if path.as_os_str().is_empty() || path == Path::new("-") {
      info!("检测结果输出到标准输出");
      return Ok(Self::with_writer(std::io::stdout()).with_min_score(min_score));
    }

    info!("检测结果输出到文件: {}", path.display());
    let file = File::create(&path)?;
    Ok(Self::with_writer(BufWriter::new(file)).with_min_score(min_score))
  }
}

impl JsonLinesOutput {
  pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
    Self {
      writer: Mutex::new(Box::new(writer)),
      min_score: 0.0,
    }
  }

  pub fn with_min_score(mut self, min_score: f32) -> Self {
    self.min_score = min_score;
    self
  }
}

fn json_score(score: f32) -> f64 {
  (score as f64 * 1e6).round() / 1e6
}

pub fn detection_record(index: u64, result: &DetectionList) -> Value {
  let detections: Vec<Value> = result
    .iter()
    .map(|det| json!({ "label": det.label, "score": json_score(det.score) }))
    .collect();

  json!({
    "frame": index,
    "time": Utc::now().to_rfc3339(),
    "detections": detections,
  })
}

impl Render<DetectionList> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, index: u64, result: &DetectionList) -> Result<(), Self::Error> {
    let kept = result.at_least(self.min_score);
    let line = serde_json::to_string(&detection_record(index, &kept))?;
    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    writeln!(writer, "{}", line)?;
    writer.flush()?;
    Ok(())
  }
}
