// 该文件是 Jiuhu （救护） 项目的一部分。
// src/relevance.rs - 相关性过滤与置信度提升
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

use crate::model::{Classification, ClassifyResult};

/// 判断标签是否与急救车辆相关的关键字，按子串匹配。
pub const RELEVANCE_KEYWORDS: [&str; 7] = [
  "ambulance",
  "emergency",
  "vehicle",
  "siren",
  "medical",
  "rescue",
  "hospital",
];

/// 置信度提升规则，按顺序匹配，命中第一条即停止。
const BOOST_RULES: [(&str, f32); 2] = [("ambulance", 1.2), ("emergency", 1.1)];

/// 过滤与提升之后的检测结果。
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub label: String,
  pub score: f32,
}

impl From<Classification> for Detection {
  fn from(item: Classification) -> Self {
    Self {
      label: item.label,
      score: item.score,
    }
  }
}

/// 单帧的检测结果列表，保持分类器原有的相对顺序。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionList {
  pub items: Box<[Detection]>,
}

impl DetectionList {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  /// 只保留分数不低于 `min_score` 的条目，顺序不变。
  pub fn at_least(&self, min_score: f32) -> DetectionList {
    self
      .iter()
      .filter(|det| det.score >= min_score)
      .cloned()
      .collect::<Vec<_>>()
      .into()
  }
}

impl From<Vec<Detection>> for DetectionList {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a DetectionList {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

pub fn is_relevant(label: &str) -> bool {
  let label = label.to_lowercase();
  RELEVANCE_KEYWORDS
    .iter()
    .any(|keyword| label.contains(keyword))
}

/// 丢弃与任何关键字都不匹配的条目，不重新排序。
pub fn filter_relevant(items: &[Classification]) -> Vec<Detection> {
  items
    .iter()
    .filter(|item| is_relevant(&item.label))
    .cloned()
    .map(Detection::from)
    .collect()
}

pub fn boost_multiplier(label: &str) -> f32 {
  let label = label.to_lowercase();
  BOOST_RULES
    .iter()
    .find(|(keyword, _)| label.contains(keyword))
    .map(|&(_, multiplier)| multiplier)
    .unwrap_or(1.0)
}

/// 结果总是落在 [0, 1] 内。
pub fn boost(detection: Detection) -> Detection {
  let score = detection.score * boost_multiplier(&detection.label);
  let score = if score.is_nan() {
    0.0
  } else {
    score.clamp(0.0, 1.0)
  };

  Detection { score, ..detection }
}

/// 把分类器原始输出变成最终检测结果：先过滤，再提升。
pub fn refine(result: &ClassifyResult) -> DetectionList {
  filter_relevant(&result.items)
    .into_iter()
    .map(boost)
    .collect::<Vec<_>>()
    .into()
}
