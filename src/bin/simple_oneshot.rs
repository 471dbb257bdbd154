// 该文件是 Jiuhu （救护） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图片推理
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use url::Url;

use jiuhu::{
  FromUrl,
  input::InputWrapper,
  model::{ModelWrapper, acquire_classifier},
  output::OutputWrapper,
  pipeline::ClassifierSlot,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Jiuhu 单张图片推理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类模型，例如 mobilenet:///path/model.onnx?labels=/path/labels.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///path/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 log: 或 jsonl:///path/result.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "log:?always")]
  pub output: Url,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let classifier = acquire_classifier(ModelWrapper::from_url(&args.model)?).await?;
  let output = OutputWrapper::from_url(&args.output)?;

  let report = OneShotTask
    .run_task(
      input,
      Arc::new(ClassifierSlot::loaded(classifier)),
      Arc::new(output),
    )
    .await?;
  info!("检测到 {} 个目标", report.detections);

  Ok(())
}
