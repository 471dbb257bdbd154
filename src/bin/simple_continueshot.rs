// 该文件是 Jiuhu （救护） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续帧推理
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
  Arc,
  atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use std::{process, thread};

use anyhow::Result;
use clap::Parser;
use url::Url;

use jiuhu::{
  FromUrl,
  input::InputWrapper,
  model::{LoadedModel, ModelWrapper},
  output::OutputWrapper,
  pipeline::{ClassifierSlot, load_with_retries},
  task::{Backpressure, ContinuousTask, Task},
};
use tracing::{error, info, warn};

/// Jiuhu 连续帧推理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类模型，例如 mobilenet:///path/model.onnx?labels=/path/labels.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 frames:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 log: 或 jsonl:///path/result.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,
  /// 最多读取的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,
  /// 每隔多少帧推理一次
  #[arg(long, value_name = "STRIDE", default_value = "1")]
  pub frame_stride: u64,
  /// 取帧速率（帧/秒），不设置则尽快取帧
  #[arg(long, value_name = "FPS")]
  pub fps: Option<f64>,
  /// 上一帧推理未完成时等待，而不是丢弃新帧
  #[arg(long)]
  pub wait: bool,
  /// 模型加载失败后的重试次数
  #[arg(long, value_name = "RETRIES", default_value = "0")]
  pub load_retries: u32,
}

const LOAD_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        process::exit(1);
      });
    })?;
  }

  let input = InputWrapper::from_url(&args.input)?;
  let output = Arc::new(OutputWrapper::from_url(&args.output)?);

  // 模型在后台加载，加载完成前的帧得到空结果；加载彻底失败时停止任务
  let builder = ModelWrapper::from_url(&args.model)?;
  let slot: Arc<ClassifierSlot<LoadedModel>> = Arc::new(ClassifierSlot::new());
  let loader = {
    let slot = Arc::clone(&slot);
    let stop = Arc::clone(&stop);
    let retries = args.load_retries;
    tokio::spawn(async move {
      load_with_retries(
        move || builder.clone(),
        retries,
        LOAD_RETRY_DELAY,
        slot.as_ref(),
        stop.as_ref(),
      )
      .await
    })
  };

  let backpressure = if args.wait {
    Backpressure::Wait
  } else {
    Backpressure::DropWhileBusy
  };
  let frame_interval = args
    .fps
    .filter(|fps| *fps > 0.0)
    .map(|fps| Duration::from_secs_f64(1.0 / fps));
  let report = ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_frame_stride(args.frame_stride)
    .with_frame_interval(frame_interval)
    .with_backpressure(backpressure)
    .with_stop_flag(stop)
    .run_task(input, Arc::clone(&slot), output)
    .await?;

  let loaded_in_time = slot.is_loaded();
  if let Err(e) = loader.await? {
    error!("模型加载失败，任务已停止: {}", e);
    return Err(e.into());
  }
  if !loaded_in_time {
    warn!("模型在所有帧处理完之后才加载完成");
  }
  info!(
    "处理完成，共推理 {} 帧，检测到 {} 个目标",
    report.frames_classified, report.detections
  );

  Ok(())
}
