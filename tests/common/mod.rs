// 该文件是 Jiuhu （救护） 项目的一部分。
// tests/common/mod.rs - 测试用分类器与输出
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

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jiuhu::{
  frame::PixelFrame,
  model::{
    Classification, Classifier, ClassifierLoader, ClassifyResult, InferenceError, ModelLoadError,
  },
  output::Render,
  relevance::DetectionList,
};

/// 2x2 的帧，所有字节都是 `tag`，用来区分不同的帧。
pub fn tagged_frame(tag: u8) -> PixelFrame {
  PixelFrame::new(2, 2, vec![tag; 12]).unwrap()
}

pub fn raw(items: &[(&str, f32)]) -> ClassifyResult {
  items
    .iter()
    .map(|&(label, score)| Classification::new(label, score))
    .collect::<Vec<_>>()
    .into()
}

/// 按帧标记返回预先给定的结果。
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
  script: HashMap<u8, ClassifyResult>,
  fail_on: Option<u8>,
  delay: Option<Duration>,
  calls: AtomicUsize,
}

impl ScriptedClassifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, tag: u8, result: ClassifyResult) -> Self {
    self.script.insert(tag, result);
    self
  }

  pub fn failing_on(mut self, tag: u8) -> Self {
    self.fail_on = Some(tag);
    self
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn scripted(&self, tag: u8) -> ClassifyResult {
    self.script.get(&tag).cloned().unwrap_or_default()
  }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
  async fn classify(&self, frame: &PixelFrame) -> Result<ClassifyResult, InferenceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    let tag = *frame
      .as_nhwc()
      .first()
      .ok_or_else(|| InferenceError::MalformedFrame("empty frame".to_string()))?;
    if self.fail_on == Some(tag) {
      return Err(InferenceError::classifier(format!("scripted failure on {tag}")));
    }
    Ok(self.scripted(tag))
  }
}

/// 记录每次渲染的帧序号与结果。
#[derive(Default)]
pub struct CollectingOutput {
  results: Mutex<Vec<(u64, DetectionList)>>,
}

impl CollectingOutput {
  pub fn results(&self) -> Vec<(u64, DetectionList)> {
    self.results.lock().unwrap().clone()
  }
}

impl Render<DetectionList> for CollectingOutput {
  type Error = Infallible;

  fn render_result(&self, index: u64, result: &DetectionList) -> Result<(), Self::Error> {
    self.results.lock().unwrap().push((index, result.clone()));
    Ok(())
  }
}

/// 直接返回给定结果的加载器。
pub struct StaticLoader(pub Result<ScriptedClassifier, String>);

#[async_trait]
impl ClassifierLoader for StaticLoader {
  type Classifier = ScriptedClassifier;

  async fn load(self) -> Result<ScriptedClassifier, ModelLoadError> {
    self.0.map_err(ModelLoadError::ModelInvalid)
  }
}
