// 该文件是 Jiuhu （救护） 项目的一部分。
// src/pipeline.rs - 单帧推理流程
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

use std::sync::{
  Arc, OnceLock,
  atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::{
  frame::PixelFrame,
  model::{Classifier, ClassifierLoader, InferenceError, ModelLoadError, acquire_classifier},
  relevance::{DetectionList, refine},
};

/// 只写一次的分类器容器。
///
/// 模型加载完成时写入，之后只读。加载完成之前读取得到 `None`，
/// 此时推理直接返回空结果。
pub struct ClassifierSlot<C> {
  inner: OnceLock<Arc<C>>,
}

impl<C> Default for ClassifierSlot<C> {
  fn default() -> Self {
    Self {
      inner: OnceLock::new(),
    }
  }
}

impl<C> ClassifierSlot<C> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn loaded(classifier: Arc<C>) -> Self {
    let slot = Self::new();
    let _ = slot.inner.set(classifier);
    slot
  }

  /// 写入分类器。已有分类器时保留原值，并把新值退回给调用者。
  pub fn install(&self, classifier: Arc<C>) -> Result<(), Arc<C>> {
    self.inner.set(classifier).inspect_err(|_| {
      warn!("分类器已加载，忽略重复的加载结果");
    })
  }

  pub fn get(&self) -> Option<Arc<C>> {
    self.inner.get().cloned()
  }

  pub fn is_loaded(&self) -> bool {
    self.inner.get().is_some()
  }
}

/// 加载分类器并写入 `slot`，失败后最多重试 `retries` 次，每次间隔 `delay`。
///
/// 所有尝试都失败时置位 `stop`，让使用同一个 `slot` 的任务停止取帧，
/// 并返回最后一次的加载错误。
pub async fn load_with_retries<L, F>(
  mut make_loader: F,
  retries: u32,
  delay: Duration,
  slot: &ClassifierSlot<L::Classifier>,
  stop: &AtomicBool,
) -> Result<(), ModelLoadError>
where
  L: ClassifierLoader,
  F: FnMut() -> L,
{
  let mut attempt = 0;
  loop {
    match acquire_classifier(make_loader()).await {
      Ok(classifier) => {
        let _ = slot.install(classifier);
        return Ok(());
      }
      Err(e) if attempt < retries => {
        attempt += 1;
        warn!("第 {} 次加载失败: {}, {:?} 后重试", attempt, e, delay);
        tokio::time::sleep(delay).await;
      }
      Err(e) => {
        error!("模型加载失败 {} 次，停止任务", attempt + 1);
        stop.store(true, Ordering::SeqCst);
        return Err(e);
      }
    }
  }
}

/// 分类、过滤并提升一帧，失败时返回错误。
///
/// 没有分类器时不调用任何推理，直接返回空列表。
pub async fn try_detect<C: Classifier + ?Sized>(
  classifier: Option<&C>,
  frame: &PixelFrame,
) -> Result<DetectionList, InferenceError> {
  let Some(classifier) = classifier else {
    debug!("分类器尚未加载，跳过推理");
    return Ok(DetectionList::empty());
  };

  let result = classifier.classify(frame).await?;
  debug!("原始分类结果 {} 项", result.len());
  Ok(refine(&result))
}

/// 与 [`try_detect`] 相同，但推理失败只记录日志并返回空列表。
pub async fn detect<C: Classifier + ?Sized>(
  classifier: Option<&C>,
  frame: &PixelFrame,
) -> DetectionList {
  match try_detect(classifier, frame).await {
    Ok(detections) => detections,
    Err(e) => {
      error!("推理失败: {}", e);
      DetectionList::empty()
    }
  }
}
