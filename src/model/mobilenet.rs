// 该文件是 Jiuhu （救护） 项目的一部分。
// src/model/mobilenet.rs - MobileNet 图像分类模型
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
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PixelFrame,
  model::{
    Classification, Classifier, ClassifierLoader, ClassifyResult, InferenceError, ModelLoadError,
  },
  url_path,
};

const MOBILENET_SCHEME: &str = "mobilenet";
const MOBILENET_DEFAULT_SIZE: u32 = 224;
const MOBILENET_DEFAULT_TOP_K: usize = 3;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

type MobilenetPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

pub struct Mobilenet {
  plan: MobilenetPlan,
  labels: Box<[String]>,
  input_size: u32,
  top_k: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MobilenetBuilder {
  model_path: String,
  labels_path: String,
  input_size: u32,
  top_k: usize,
}

impl FromUrlWithScheme for MobilenetBuilder {
  const SCHEME: &'static str = MOBILENET_SCHEME;
}

impl FromUrl for MobilenetBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut labels_path = None;
    let mut input_size = MOBILENET_DEFAULT_SIZE;
    let mut top_k = MOBILENET_DEFAULT_TOP_K;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "labels" => labels_path = Some(v.to_string()),
        "size" => {
          input_size = v
            .parse()
            .map_err(|_| ModelLoadError::ModelPathError(format!("无效的输入尺寸: {}", v)))?
        }
        "top_k" => {
          top_k = v
            .parse()
            .map_err(|_| ModelLoadError::ModelPathError(format!("无效的 top_k: {}", v)))?
        }
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }

    let labels_path = labels_path
      .ok_or_else(|| ModelLoadError::ModelPathError("缺少 labels 参数".to_string()))?;
    if input_size == 0 || top_k == 0 {
      return Err(ModelLoadError::ModelPathError(
        "size 与 top_k 必须大于 0".to_string(),
      ));
    }

    Ok(MobilenetBuilder {
      model_path: url_path(url).to_string_lossy().into_owned(),
      labels_path,
      input_size,
      top_k,
    })
  }
}

#[async_trait]
impl ClassifierLoader for MobilenetBuilder {
  type Classifier = Mobilenet;

  async fn load(self) -> Result<Mobilenet, ModelLoadError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = tokio::fs::read(&self.model_path).await?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("加载标签文件: {}", self.labels_path);
    let labels = parse_labels(&tokio::fs::read_to_string(&self.labels_path).await?);
    if labels.is_empty() {
      error!("标签文件为空: {}", self.labels_path);
      return Err(ModelLoadError::ModelInvalid(format!(
        "标签文件为空: {}",
        self.labels_path
      )));
    }
    debug!("标签数量: {}", labels.len());

    let size = self.input_size as usize;
    let plan = tract_onnx::onnx()
      .model_for_read(&mut std::io::Cursor::new(model_data))
      .map_err(ModelLoadError::runtime)?
      .with_input_fact(0, f32::fact([1, 3, size, size]).into())
      .map_err(ModelLoadError::runtime)?
      .into_optimized()
      .map_err(ModelLoadError::runtime)?
      .into_runnable()
      .map_err(ModelLoadError::runtime)?;

    Ok(Mobilenet {
      plan,
      labels,
      input_size: self.input_size,
      top_k: self.top_k,
    })
  }
}

fn parse_labels(text: &str) -> Box<[String]> {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(String::from)
    .collect()
}

/// 缩放到 `size`x`size`，按 ImageNet 均值方差归一化，排成 NCHW。
fn frame_to_tensor(frame: &PixelFrame, size: u32) -> Result<Tensor, InferenceError> {
  if frame.is_empty() {
    return Err(InferenceError::MalformedFrame(format!(
      "帧尺寸为 {}x{}",
      frame.width(),
      frame.height()
    )));
  }
  let image = frame
    .to_rgb_image()
    .ok_or_else(|| InferenceError::MalformedFrame("像素数据与尺寸不符".to_string()))?;

  let resized = imageops::resize(&image, size, size, FilterType::Triangle);
  let tensor = tract_ndarray::Array4::from_shape_fn(
    (1, 3, size as usize, size as usize),
    |(_, c, y, x)| {
      let pixel = resized.get_pixel(x as u32, y as u32);
      (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    },
  );
  Ok(tensor.into_tensor())
}

/// 某些导出的模型带有背景类，此时第 0 个输出需要跳过。
fn class_offset(num_outputs: usize, num_labels: usize) -> Result<usize, InferenceError> {
  match num_outputs.checked_sub(num_labels) {
    Some(offset @ (0 | 1)) => Ok(offset),
    _ => Err(InferenceError::classifier(format!(
      "模型输出 {} 类, 标签文件有 {} 个",
      num_outputs, num_labels
    ))),
  }
}

#[async_trait]
impl Classifier for Mobilenet {
  async fn classify(&self, frame: &PixelFrame) -> Result<ClassifyResult, InferenceError> {
    debug!("设置模型输入: {}x{}", frame.width(), frame.height());
    let input = frame_to_tensor(frame, self.input_size)?;

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(input.into_tvalue()))
      .map_err(InferenceError::classifier)?;
    let output = outputs
      .first()
      .ok_or_else(|| InferenceError::classifier("模型没有输出"))?
      .to_array_view::<f32>()
      .map_err(InferenceError::classifier)?;

    let logits: Vec<f32> = output.iter().copied().collect();
    let offset = class_offset(logits.len(), self.labels.len())?;
    let scores = into_probabilities(logits[offset..].to_vec());

    let items: Vec<Classification> = top_k(&scores, self.top_k)
      .into_iter()
      .map(|(idx, score)| Classification::new(self.labels[idx].clone(), score))
      .collect();
    debug!("分类结果: {:?}", items);

    Ok(ClassifyResult::from(items))
  }
}

/// 若输出已是概率分布则原样返回，否则做 softmax。
fn into_probabilities(values: Vec<f32>) -> Vec<f32> {
  let sum: f32 = values.iter().sum();
  let in_range = values.iter().all(|v| (0.0..=1.0).contains(v));
  if in_range && (sum - 1.0).abs() < 1e-3 {
    return values;
  }

  let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
  let total: f32 = exps.iter().sum();
  exps.into_iter().map(|e| e / total).collect()
}

fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
  let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
  ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
  ranked.truncate(k);
  ranked
}
