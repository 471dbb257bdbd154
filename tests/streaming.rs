// 该文件是 Jiuhu （救护） 项目的一部分。
// tests/streaming.rs - 单张与连续推理任务测试
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

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{CollectingOutput, ScriptedClassifier, StaticLoader, raw, tagged_frame};
use jiuhu::{
  frame::PixelFrame,
  model::ModelLoadError,
  pipeline::{ClassifierSlot, load_with_retries},
  relevance::refine,
  task::{Backpressure, ContinuousTask, OneShotTask, Task, TaskReport},
};

fn frames(count: u8) -> std::vec::IntoIter<PixelFrame> {
  (0..count).map(tagged_frame).collect::<Vec<_>>().into_iter()
}

fn scripted_stream() -> ScriptedClassifier {
  ScriptedClassifier::new()
    .with(0, raw(&[("ambulance", 0.9), ("dog", 0.05)]))
    .with(1, raw(&[("tabby cat", 0.8)]))
    .with(2, raw(&[("emergency vehicle", 0.5), ("siren", 0.2)]))
    .with(3, raw(&[("fire truck", 0.4), ("ambulance", 0.7), ("dog", 0.95)]))
    .with(4, raw(&[("hospital", 0.3)]))
}

#[tokio::test]
async fn every_frame_is_classified_independently() {
  let classifier = Arc::new(scripted_stream());
  let output = Arc::new(CollectingOutput::default());

  let report = ContinuousTask::default()
    .with_backpressure(Backpressure::Wait)
    .run_task(
      frames(5),
      Arc::new(ClassifierSlot::loaded(Arc::clone(&classifier))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  let results = output.results();
  assert_eq!(results.len(), 5);
  for (index, result) in results {
    assert_eq!(result, refine(&classifier.scripted(index as u8)));
  }
  assert_eq!(report.frames_seen, 5);
  assert_eq!(report.frames_classified, 5);
  assert_eq!(report.frames_dropped, 0);
  assert_eq!(report.detections, 5);
}

#[tokio::test(start_paused = true)]
async fn busy_classifier_drops_new_frames() {
  let classifier = Arc::new(scripted_stream().with_delay(Duration::from_millis(100)));
  let output = Arc::new(CollectingOutput::default());

  let report = ContinuousTask::default()
    .run_task(
      frames(5),
      Arc::new(ClassifierSlot::loaded(Arc::clone(&classifier))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  assert_eq!(classifier.calls(), 1);
  assert_eq!(output.results().len(), 1);
  assert_eq!(output.results()[0].0, 0);
  assert_eq!(
    report,
    TaskReport {
      frames_seen: 5,
      frames_classified: 1,
      frames_unloaded: 0,
      frames_dropped: 4,
      frames_skipped: 0,
      detections: 1,
    }
  );
}

#[tokio::test(start_paused = true)]
async fn paced_frames_wait_for_slow_classifier_when_asked() {
  let classifier = Arc::new(scripted_stream().with_delay(Duration::from_millis(100)));
  let output = Arc::new(CollectingOutput::default());

  let report = ContinuousTask::default()
    .with_frame_interval(Some(Duration::from_millis(10)))
    .with_backpressure(Backpressure::Wait)
    .run_task(
      frames(3),
      Arc::new(ClassifierSlot::loaded(Arc::clone(&classifier))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  let indices: Vec<u64> = output.results().iter().map(|(i, _)| *i).collect();
  assert_eq!(indices, vec![0, 1, 2]);
  assert_eq!(report.frames_dropped, 0);
}

#[tokio::test]
async fn stride_skips_frames_between_classifications() {
  let classifier = Arc::new(scripted_stream());
  let output = Arc::new(CollectingOutput::default());

  let report = ContinuousTask::default()
    .with_frame_stride(2)
    .with_backpressure(Backpressure::Wait)
    .run_task(
      frames(5),
      Arc::new(ClassifierSlot::loaded(Arc::clone(&classifier))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  let indices: Vec<u64> = output.results().iter().map(|(i, _)| *i).collect();
  assert_eq!(indices, vec![0, 2, 4]);
  assert_eq!(report.frames_skipped, 2);
  assert_eq!(report.frames_classified, 3);
}

#[tokio::test]
async fn frame_number_limits_the_stream() {
  let output = Arc::new(CollectingOutput::default());

  let report = ContinuousTask::default()
    .with_frame_number(Some(2))
    .with_backpressure(Backpressure::Wait)
    .run_task(
      frames(5),
      Arc::new(ClassifierSlot::loaded(Arc::new(scripted_stream()))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  assert_eq!(report.frames_seen, 2);
  assert_eq!(output.results().len(), 2);
}

#[tokio::test]
async fn stop_flag_halts_scheduling() {
  let output = Arc::new(CollectingOutput::default());

  let report = ContinuousTask::default()
    .with_stop_flag(Arc::new(AtomicBool::new(true)))
    .run_task(
      frames(5),
      Arc::new(ClassifierSlot::loaded(Arc::new(scripted_stream()))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  assert_eq!(report.frames_seen, 0);
  assert!(output.results().is_empty());
}

#[tokio::test]
async fn frames_before_model_load_render_empty() {
  let output = Arc::new(CollectingOutput::default());

  let report = ContinuousTask::default()
    .with_backpressure(Backpressure::Wait)
    .run_task(
      frames(3),
      Arc::new(ClassifierSlot::<ScriptedClassifier>::new()),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  let results = output.results();
  assert_eq!(results.len(), 3);
  assert!(results.iter().all(|(_, result)| result.is_empty()));
  assert_eq!(report.detections, 0);
  assert_eq!(report.frames_classified, 0);
  assert_eq!(report.frames_unloaded, 3);
}

#[tokio::test(start_paused = true)]
async fn failed_model_load_stops_the_stream() {
  let slot = Arc::new(ClassifierSlot::<ScriptedClassifier>::new());
  let stop = Arc::new(AtomicBool::new(false));
  let output = Arc::new(CollectingOutput::default());
  let mut attempts = 0;

  let load = load_with_retries(
    || {
      attempts += 1;
      StaticLoader(Err("missing weights".to_string()))
    },
    1,
    Duration::from_secs(2),
    slot.as_ref(),
    stop.as_ref(),
  );
  let run = ContinuousTask::default()
    .with_frame_interval(Some(Duration::from_secs(1)))
    .with_backpressure(Backpressure::Wait)
    .with_stop_flag(Arc::clone(&stop))
    .run_task(frames(10), Arc::clone(&slot), Arc::clone(&output));
  let (loaded, report) = tokio::join!(load, run);

  assert!(matches!(loaded, Err(ModelLoadError::ModelInvalid(_))));
  assert_eq!(attempts, 2);
  assert!(stop.load(Ordering::SeqCst));
  assert!(!slot.is_loaded());

  let report = report.unwrap();
  assert!(report.frames_seen < 10, "{report:?}");
  assert_eq!(report.frames_classified, 0);
  assert_eq!(report.frames_unloaded, report.frames_seen);
}

#[tokio::test(start_paused = true)]
async fn model_load_succeeds_on_retry() {
  let slot = ClassifierSlot::new();
  let stop = AtomicBool::new(false);
  let mut attempts = 0;

  load_with_retries(
    || {
      attempts += 1;
      if attempts == 1 {
        StaticLoader(Err("busy".to_string()))
      } else {
        StaticLoader(Ok(scripted_stream()))
      }
    },
    2,
    Duration::from_secs(2),
    &slot,
    &stop,
  )
  .await
  .unwrap();

  assert_eq!(attempts, 2);
  assert!(slot.is_loaded());
  assert!(!stop.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_frame_does_not_stop_the_stream() {
  let classifier = Arc::new(scripted_stream().failing_on(0));
  let output = Arc::new(CollectingOutput::default());

  ContinuousTask::default()
    .with_backpressure(Backpressure::Wait)
    .run_task(
      frames(4),
      Arc::new(ClassifierSlot::loaded(Arc::clone(&classifier))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  let results = output.results();
  assert_eq!(results.len(), 4);
  assert!(results[0].1.is_empty());
  assert_eq!(results[3].1, refine(&classifier.scripted(3)));
}

#[tokio::test]
async fn one_shot_classifies_first_frame() {
  let output = Arc::new(CollectingOutput::default());

  let report = OneShotTask
    .run_task(
      frames(3).skip(2),
      Arc::new(ClassifierSlot::loaded(Arc::new(scripted_stream()))),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  let results = output.results();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].1.items[0].label, "emergency vehicle");
  assert_eq!(report.detections, 2);
  assert_eq!(report.frames_classified, 1);
}

#[tokio::test]
async fn one_shot_without_model_is_not_counted_as_classified() {
  let output = Arc::new(CollectingOutput::default());

  let report = OneShotTask
    .run_task(
      frames(1),
      Arc::new(ClassifierSlot::<ScriptedClassifier>::new()),
      Arc::clone(&output),
    )
    .await
    .unwrap();

  assert!(output.results()[0].1.is_empty());
  assert_eq!(report.frames_classified, 0);
  assert_eq!(report.frames_unloaded, 1);
}

#[tokio::test]
async fn one_shot_without_input_is_an_error() {
  let output = Arc::new(CollectingOutput::default());

  let result = OneShotTask
    .run_task(
      frames(0),
      Arc::new(ClassifierSlot::loaded(Arc::new(scripted_stream()))),
      output,
    )
    .await;
  assert!(result.is_err());
}
