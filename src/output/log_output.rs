// 该文件是 Jiuhu （救护） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render, min_score_param},
  relevance::DetectionList,
};

/// 通过 tracing 打印检测结果，分数以百分比显示。
///
/// `log:?always` 时没有检测结果的帧也会打印；`?min_score=0.3` 只打印分数不低于 0.3 的结果。
#[derive(Debug, Default)]
pub struct LogOutput {
  always: bool,
  min_score: f32,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }

    let always = url.query_pairs().any(|(k, _)| k == "always");
    let min_score = min_score_param(url)?;
    Ok(LogOutput { always, min_score })
  }
}

pub fn format_percentage(score: f32) -> String {
  format!("{:.2}%", score * 100.0)
}

impl Render<DetectionList> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, index: u64, result: &DetectionList) -> Result<(), Self::Error> {
    let result = result.at_least(self.min_score);
    if result.is_empty() {
      if self.always {
        info!("帧 {}: 未检测到急救车辆", index);
      } else {
        debug!("帧 {}: 无检测结果", index);
      }
      return Ok(());
    }

    info!("帧 {}: 检测到 {} 个目标", index, result.len());
    for det in &result {
      info!("  - {}: {} 置信度", det.label, format_percentage(det.score));
    }
    Ok(())
  }
}
