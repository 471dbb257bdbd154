// 该文件是 Jiuhu （救护） 项目的一部分。
// src/task.rs - 单张与连续推理任务
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
use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
  frame::PixelFrame,
  model::Classifier,
  output::Render,
  pipeline::{ClassifierSlot, detect},
  relevance::DetectionList,
};

#[async_trait]
pub trait Task<I, C, O>: Sized {
  type Error;
  async fn run_task(
    self,
    input: I,
    classifier: Arc<ClassifierSlot<C>>,
    output: Arc<O>,
  ) -> Result<TaskReport, Self::Error>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
  /// 从输入取得的帧数
  pub frames_seen: u64,
  /// 实际交给分类器推理的帧数
  pub frames_classified: u64,
  /// 分类器尚未加载、直接得到空结果的帧数
  pub frames_unloaded: u64,
  /// 因上一帧仍在推理而丢弃的帧数
  pub frames_dropped: u64,
  /// 按步长跳过的帧数
  pub frames_skipped: u64,
  pub detections: u64,
}

pub struct OneShotTask;

#[async_trait]
impl<I, C, O> Task<I, C, O> for OneShotTask
where
  I: Iterator<Item = PixelFrame> + Send + 'static,
  C: Classifier + 'static,
  O: Render<DetectionList> + 'static,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(
    self,
    mut input: I,
    classifier: Arc<ClassifierSlot<C>>,
    output: Arc<O>,
  ) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");

    let now = Instant::now();
    let model = classifier.get();
    let loaded = model.is_some();
    let result = detect(model.as_deref(), &frame).await;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(0, &result)?;

    Ok(TaskReport {
      frames_seen: 1,
      frames_classified: u64::from(loaded),
      frames_unloaded: u64::from(!loaded),
      detections: result.len() as u64,
      ..TaskReport::default()
    })
  }
}

/// 上一帧还在推理时，新到的帧如何处理。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backpressure {
  /// 丢弃新帧，同一时刻最多一个推理请求。
  #[default]
  DropWhileBusy,
  /// 等待上一帧完成后再提交，不丢帧。
  Wait,
}

/// 逐帧推理视频流。每帧独立分类，不在帧之间保留任何状态。
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
  frame_stride: u64,
  frame_interval: Option<Duration>,
  backpressure: Backpressure,
  stop: Option<Arc<AtomicBool>>,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      frame_stride: 1,
      frame_interval: None,
      backpressure: Backpressure::default(),
      stop: None,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 每 `stride` 帧推理一帧，0 视为 1。
  pub fn with_frame_stride(mut self, stride: u64) -> Self {
    self.frame_stride = stride.max(1);
    self
  }

  /// 按固定间隔取帧，模拟显示端的刷新节奏。
  pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
    self.frame_interval = interval.filter(|d| !d.is_zero());
    self
  }

  pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
    self.backpressure = backpressure;
    self
  }

  /// 标志置位后不再取新帧，正在进行的推理会正常结束。
  /// 中断信号与模型加载失败都通过它停止任务。
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn should_stop(&self) -> bool {
    self
      .stop
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::SeqCst))
  }
}

type InFlight<E> = JoinHandle<Result<usize, E>>;

#[async_trait]
impl<I, C, O> Task<I, C, O> for ContinuousTask
where
  I: Iterator<Item = PixelFrame> + Send + 'static,
  C: Classifier + 'static,
  O: Render<DetectionList> + 'static,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(
    self,
    input: I,
    classifier: Arc<ClassifierSlot<C>>,
    output: Arc<O>,
  ) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let started = Instant::now();
    let mut report = TaskReport::default();
    let mut in_flight: Option<InFlight<O::Error>> = None;
    let mut ticker = self.frame_interval.map(|period| {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      ticker
    });

    let limit = self
      .frame_number
      .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
      .unwrap_or(usize::MAX);

    for frame in input.take(limit) {
      match ticker.as_mut() {
        Some(ticker) => {
          ticker.tick().await;
        }
        None => tokio::task::yield_now().await,
      }

      if self.should_stop() {
        warn!("收到停止信号，退出任务循环");
        break;
      }

      let index = report.frames_seen;
      report.frames_seen += 1;

      if index % self.frame_stride != 0 {
        report.frames_skipped += 1;
        continue;
      }

      if let Some(handle) = in_flight.take() {
        if handle.is_finished() || self.backpressure == Backpressure::Wait {
          report.detections += handle.await?? as u64;
        } else {
          debug!("上一帧仍在推理，丢弃第 {} 帧", index);
          report.frames_dropped += 1;
          in_flight = Some(handle);
          continue;
        }
      }

      debug!("处理第 {} 帧图像", index);
      let model = classifier.get();
      if model.is_some() {
        report.frames_classified += 1;
      } else {
        report.frames_unloaded += 1;
      }
      let output = Arc::clone(&output);
      in_flight = Some(tokio::spawn(async move {
        let now = Instant::now();
        let result = detect(model.as_deref(), &frame).await;
        debug!("第 {} 帧推理完成，耗时: {:.2?}", index, now.elapsed());
        output.render_result(index, &result)?;
        Ok::<usize, O::Error>(result.len())
      }));
    }

    if let Some(handle) = in_flight.take() {
      report.detections += handle.await?? as u64;
    }

    let elapsed = started.elapsed();
    info!(
      "任务完成: 共 {} 帧, 推理 {} 帧, 模型未就绪 {} 帧, 丢弃 {} 帧, 跳过 {} 帧, 检测到 {} 个目标",
      report.frames_seen,
      report.frames_classified,
      report.frames_unloaded,
      report.frames_dropped,
      report.frames_skipped,
      report.detections
    );
    if report.frames_classified > 0 && !elapsed.is_zero() {
      info!(
        "平均推理帧率: {:.2} 帧/秒",
        report.frames_classified as f64 / elapsed.as_secs_f64()
      );
    }

    Ok(report)
  }
}
