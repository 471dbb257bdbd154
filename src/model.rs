// 该文件是 Jiuhu （救护） 项目的一部分。
// src/model.rs - 分类模型
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

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::{FromUrl, frame::PixelFrame};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 分类器给出的单个标签及其分数，分数位于 [0, 1]。
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  pub label: String,
  pub score: f32,
}

impl Classification {
  pub fn new(label: impl Into<String>, score: f32) -> Self {
    Self {
      label: label.into(),
      score,
    }
  }
}

/// 分类器的原始输出，按分数降序排列，长度不超过分类器的 top-K。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyResult {
  pub items: Box<[Classification]>,
}

impl ClassifyResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<Classification>> for ClassifyResult {
  fn from(items: Vec<Classification>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型运行时错误: {0}")]
  RuntimeError(BoxError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

impl ModelLoadError {
  pub fn runtime<E: Into<BoxError>>(err: E) -> Self {
    ModelLoadError::RuntimeError(err.into())
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("输入帧无效: {0}")]
  MalformedFrame(String),
  #[error("分类器内部错误: {0}")]
  ClassifierError(BoxError),
}

impl InferenceError {
  pub fn classifier<E: Into<BoxError>>(err: E) -> Self {
    InferenceError::ClassifierError(err.into())
  }
}

/// 能对像素帧做分类的对象。
///
/// 实现必须在多次调用之间保持无状态，以便同一个实例被并发调用。
#[async_trait]
pub trait Classifier: Send + Sync {
  async fn classify(&self, frame: &PixelFrame) -> Result<ClassifyResult, InferenceError>;
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for Arc<C> {
  async fn classify(&self, frame: &PixelFrame) -> Result<ClassifyResult, InferenceError> {
    (**self).classify(frame).await
  }
}

/// 负责获取一个可用的分类器。
#[async_trait]
pub trait ClassifierLoader: Send {
  type Classifier: Classifier;

  async fn load(self) -> Result<Self::Classifier, ModelLoadError>;
}

/// 获取分类器。失败时原样返回 `ModelLoadError`，是否重试由调用者决定。
pub async fn acquire_classifier<L: ClassifierLoader>(
  loader: L,
) -> Result<Arc<L::Classifier>, ModelLoadError> {
  info!("开始加载分类模型");
  let now = std::time::Instant::now();
  match loader.load().await {
    Ok(classifier) => {
      info!("模型加载完成，耗时: {:.2?}", now.elapsed());
      Ok(Arc::new(classifier))
    }
    Err(e) => {
      error!("模型加载失败: {}", e);
      Err(e)
    }
  }
}

#[cfg(feature = "model_mobilenet")]
mod mobilenet;
#[cfg(feature = "model_mobilenet")]
pub use self::mobilenet::{Mobilenet, MobilenetBuilder};

#[derive(Debug, Clone)]
pub enum ModelWrapper {
  #[cfg(feature = "model_mobilenet")]
  Mobilenet(MobilenetBuilder),
}

impl FromUrl for ModelWrapper {
  type Error = ModelLoadError;

  #[allow(unreachable_code, unused_variables)]
  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_mobilenet")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == MobilenetBuilder::SCHEME {
        return Ok(ModelWrapper::Mobilenet(MobilenetBuilder::from_url(url)?));
      }
    }
    Err(ModelLoadError::SchemeMismatch)
  }
}

pub enum LoadedModel {
  #[cfg(feature = "model_mobilenet")]
  Mobilenet(Mobilenet),
}

#[async_trait]
impl ClassifierLoader for ModelWrapper {
  type Classifier = LoadedModel;

  async fn load(self) -> Result<Self::Classifier, ModelLoadError> {
    match self {
      #[cfg(feature = "model_mobilenet")]
      ModelWrapper::Mobilenet(builder) => Ok(LoadedModel::Mobilenet(builder.load().await?)),
    }
  }
}

#[async_trait]
impl Classifier for LoadedModel {
  #[allow(unused_variables)]
  async fn classify(&self, frame: &PixelFrame) -> Result<ClassifyResult, InferenceError> {
    match self {
      #[cfg(feature = "model_mobilenet")]
      LoadedModel::Mobilenet(model) => model.classify(frame).await,
    }
  }
}
