// 该文件是 Jiuhu （救护） 项目的一部分。
// src/output.rs - 输出定义
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

use crate::relevance::DetectionList;
use crate::{FromUrl, FromUrlWithScheme};
use thiserror::Error;
use url::Url;

/// 检测结果的展示端。每处理完一帧调用一次，`index` 为帧序号。
pub trait Render<Output>: Send + Sync {
  type Error;
  fn render_result(&self, index: u64, result: &Output) -> Result<(), Self::Error>;
}

mod json_lines;
mod log_output;
pub use self::json_lines::{JsonLinesOutput, JsonLinesOutputError};
pub use self::log_output::LogOutput;

#[derive(Error, Debug)]
#[error("无效的 min_score: {0}, 取值范围为 [0, 1]")]
pub struct InvalidMinScore(String);

/// 读取 `?min_score=`，分数低于该值的检测结果不输出。缺省为 0，即全部输出。
pub fn min_score_param(url: &Url) -> Result<f32, InvalidMinScore> {
  match url.query_pairs().find(|(k, _)| k == "min_score") {
    None => Ok(0.0),
    Some((_, v)) => v
      .parse::<f32>()
      .ok()
      .filter(|score| (0.0..=1.0).contains(score))
      .ok_or_else(|| InvalidMinScore(v.into_owned())),
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[error(transparent)]
  InvalidMinScore(#[from] InvalidMinScore),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  LogOutput(LogOutput),
  JsonLinesOutput(JsonLinesOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::LogOutput(LogOutput::from_url(url)?)),
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLinesOutput(
        JsonLinesOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<DetectionList> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, index: u64, result: &DetectionList) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::LogOutput(output) => output
        .render_result(index, result)
        .map_err(|never| match never {}),
      OutputWrapper::JsonLinesOutput(output) => output
        .render_result(index, result)
        .map_err(OutputError::from),
    }
  }
}
