// 该文件是 DtexCamera 项目的一部分。
// tests/session_tests.rs - 相机会话集成测试
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

#![cfg(feature = "model_replay")]

use std::{
  sync::{
    Arc, Mutex,
    mpsc::{self, Receiver, Sender},
  },
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;

use dtex_camera::{
  capture::{CaptureError, StillCallback, StillCapture, StillCaptureSettings, StillImage},
  config::PipelineConfig,
  frame::Frame,
  gate::Orientation,
  model::{
    InferenceAdapter, InferenceEngine, ReplayEngine, TensorDescriptor, TensorType,
    replay::{ReplayFrame, ReplayInput, ReplayModel},
  },
  motion::{MotionSample, Vector3},
  task::{CameraSession, SessionEvent},
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + TIMEOUT;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}

/// 静止，俯仰 0.6 弧度
fn steady_sample() -> MotionSample {
  MotionSample {
    pitch: 0.6,
    user_acceleration: Vector3::default(),
    gravity: Vector3::new(0.0, -1.0, 0.0),
  }
}

fn frame() -> Frame {
  Frame::from(RgbImage::new(8, 8))
}

fn detected() -> ReplayFrame {
  ReplayFrame {
    scores: vec![0.9],
    boxes: vec![0.1, 0.1, 0.6, 0.6],
    count: None,
    categories: vec![1.0],
  }
}

fn nothing() -> ReplayFrame {
  ReplayFrame::default()
}

fn replay_adapter(frames: Vec<ReplayFrame>) -> InferenceAdapter<ReplayEngine> {
  let engine = ReplayEngine::new(ReplayModel {
    input: ReplayInput {
      size: 4,
      tensor_type: TensorType::UInt8,
    },
    frames,
  })
  .unwrap();
  InferenceAdapter::with_engine(engine).unwrap()
}

/// 把回调保存下来，由测试决定何时以及如何送达
#[derive(Clone, Default)]
struct ManualStill {
  pending: Arc<Mutex<Vec<StillCallback>>>,
}

impl ManualStill {
  fn wait_pending(&self) -> StillCallback {
    let mut callback = None;
    assert!(wait_until(|| {
      callback = self.pending.lock().unwrap().pop();
      callback.is_some()
    }));
    callback.unwrap()
  }
}

impl StillCapture for ManualStill {
  fn request_still(&mut self, _: &StillCaptureSettings, done: StillCallback) {
    self.pending.lock().unwrap().push(done);
  }
}

fn jpeg() -> StillImage {
  StillImage::from(vec![0xFF, 0xD8, 0xFF, 0xD9])
}

struct Harness {
  session: CameraSession,
  events: Receiver<SessionEvent>,
  frames: Sender<Frame>,
  motion: Sender<MotionSample>,
  still: ManualStill,
}

impl Harness {
  fn start<E: InferenceEngine + Send + 'static>(adapter: InferenceAdapter<E>) -> Self {
    let (frames, frame_rx) = mpsc::channel();
    let (motion, motion_rx) = mpsc::channel();
    let still = ManualStill::default();
    let (session, events) = CameraSession::start(
      &PipelineConfig::default(),
      adapter,
      still.clone(),
      frame_rx,
      motion_rx,
    )
    .unwrap();
    Self {
      session,
      events,
      frames,
      motion,
      still,
    }
  }

  fn steady(&self) {
    let before = self.session.stats().motion_samples;
    self.motion.send(steady_sample()).unwrap();
    assert!(wait_until(|| self.session.stats().motion_samples > before));
  }

  fn analyse(&self) {
    let before = self.session.stats().analysed;
    self.frames.send(frame()).unwrap();
    assert!(wait_until(|| self.session.stats().analysed > before));
  }

  fn next_event(&self) -> SessionEvent {
    self.events.recv_timeout(TIMEOUT).unwrap()
  }
}

#[test]
fn verdict_is_snapshotted_when_shutter_fires() {
  let harness = Harness::start(replay_adapter(vec![detected(), nothing()]));
  harness.steady();
  harness.analyse();
  assert!(harness.session.verdict());

  harness.session.shutter();
  let deliver = harness.still.wait_pending();
  assert!(wait_until(|| harness.session.is_overlay_frozen()));

  // 图像送达前场景变化：没有目标
  harness.analyse();
  let snapshot = harness.session.snapshot();
  assert!(!snapshot.any_detected);
  assert!(!harness.session.verdict());
  // 叠加层保持冻结时的内容
  assert_eq!(snapshot.overlay.groups.len(), 1);

  deliver(Ok(jpeg()));
  match harness.next_event() {
    SessionEvent::ReviewReady(result) => {
      assert!(result.acceptable());
      assert_eq!(result.image(), &jpeg());
    }
    other => panic!("unexpected event: {:?}", other),
  }

  harness.session.accept();
  match harness.next_event() {
    SessionEvent::Accepted(result) => assert!(result.acceptable()),
    other => panic!("unexpected event: {:?}", other),
  }
  assert!(wait_until(|| !harness.session.is_overlay_frozen()));

  // 解冻后叠加层重新跟随检测结果
  harness.analyse();
  assert_eq!(harness.session.snapshot().overlay.groups.len(), 1);
  harness.session.stop();
}

#[test]
fn failed_capture_returns_to_preview_without_leaking_verdict() {
  let harness = Harness::start(replay_adapter(vec![detected()]));
  harness.steady();
  harness.analyse();
  assert!(harness.session.verdict());

  harness.session.shutter();
  let deliver = harness.still.wait_pending();
  deliver(Err(CaptureError::Device("sensor busy".into())));
  match harness.next_event() {
    SessionEvent::CaptureFailed(e) => assert_eq!(e, CaptureError::Device("sensor busy".into())),
    other => panic!("unexpected event: {:?}", other),
  }
  assert!(wait_until(|| !harness.session.is_overlay_frozen()));

  // 横屏后再次拍摄，判定来自新的快门
  harness.session.set_orientation(Orientation::LandscapeLeft);
  assert!(!harness.session.verdict());
  harness.session.shutter();
  let deliver = harness.still.wait_pending();
  deliver(Ok(jpeg()));
  match harness.next_event() {
    SessionEvent::ReviewReady(result) => assert!(!result.acceptable()),
    other => panic!("unexpected event: {:?}", other),
  }
  harness.session.stop();
}

#[test]
fn empty_still_is_reported_as_failure() {
  let harness = Harness::start(replay_adapter(vec![detected()]));
  harness.session.shutter();
  let deliver = harness.still.wait_pending();
  deliver(Ok(StillImage::from(Vec::new())));
  match harness.next_event() {
    SessionEvent::CaptureFailed(e) => assert_eq!(e, CaptureError::NoImageData),
    other => panic!("unexpected event: {:?}", other),
  }
}

#[test]
fn retake_discards_photo_and_unfreezes_overlay() {
  let harness = Harness::start(replay_adapter(vec![detected()]));
  harness.session.shutter();
  let deliver = harness.still.wait_pending();
  deliver(Ok(jpeg()));
  assert!(matches!(harness.next_event(), SessionEvent::ReviewReady(_)));
  assert!(harness.session.is_overlay_frozen());

  harness.session.retake();
  assert!(wait_until(|| !harness.session.is_overlay_frozen()));
  // 已回到预览，确认不会产生事件
  harness.session.accept();
  assert!(
    harness
      .events
      .recv_timeout(Duration::from_millis(200))
      .is_err()
  );
}

#[test]
fn shutter_is_ignored_while_capture_in_flight() {
  let harness = Harness::start(replay_adapter(vec![detected()]));
  harness.session.shutter();
  let deliver = harness.still.wait_pending();
  harness.session.shutter();
  thread::sleep(Duration::from_millis(100));
  assert!(harness.still.pending.lock().unwrap().is_empty());
  deliver(Ok(jpeg()));
  assert!(matches!(harness.next_event(), SessionEvent::ReviewReady(_)));
}

#[test]
fn unconfigured_model_never_accepts() {
  let harness = Harness::start(InferenceAdapter::<ReplayEngine>::unconfigured());
  harness.steady();
  for _ in 0..3 {
    harness.frames.send(frame()).unwrap();
  }
  assert!(wait_until(|| harness.session.stats().received == 3));
  let stats = harness.session.stats();
  assert_eq!(stats.analysed, 0);
  assert_eq!(stats.dropped, 0);
  assert!(!harness.session.verdict());

  harness.session.shutter();
  let deliver = harness.still.wait_pending();
  deliver(Ok(jpeg()));
  match harness.next_event() {
    SessionEvent::ReviewReady(result) => assert!(!result.acceptable()),
    other => panic!("unexpected event: {:?}", other),
  }
}

/// 在 `invoke` 中阻塞，直到测试放行
struct BlockingEngine {
  entered: Sender<()>,
  release: Receiver<()>,
  outputs: [Vec<f32>; 4],
}

impl InferenceEngine for BlockingEngine {
  type Error = std::io::Error;

  fn input_tensor(&self, _: usize) -> Result<TensorDescriptor, Self::Error> {
    Ok(TensorDescriptor {
      shape: vec![1, 4, 4, 3],
      tensor_type: TensorType::UInt8,
    })
  }

  fn copy_input(&mut self, _: &[u8], _: usize) -> Result<(), Self::Error> {
    Ok(())
  }

  fn invoke(&mut self) -> Result<(), Self::Error> {
    let _ = self.entered.send(());
    self
      .release
      .recv()
      .map_err(|e| std::io::Error::other(e.to_string()))
  }

  fn output_tensor(&self, index: usize) -> Result<&[f32], Self::Error> {
    Ok(&self.outputs[index])
  }
}

#[test]
fn frames_are_dropped_while_inference_is_busy() {
  let (entered_tx, entered) = mpsc::channel();
  let (release, release_rx) = mpsc::channel();
  let engine = BlockingEngine {
    entered: entered_tx,
    release: release_rx,
    outputs: [vec![0.9], vec![0.1, 0.1, 0.6, 0.6], vec![1.0], vec![2.0]],
  };
  let harness = Harness::start(InferenceAdapter::with_engine(engine).unwrap());

  harness.frames.send(frame()).unwrap();
  entered.recv_timeout(TIMEOUT).unwrap();
  for _ in 0..4 {
    harness.frames.send(frame()).unwrap();
  }
  assert!(wait_until(|| harness.session.stats().dropped == 4));
  assert_eq!(harness.session.stats().received, 5);
  assert_eq!(harness.session.stats().analysed, 0);

  release.send(()).unwrap();
  assert!(wait_until(|| harness.session.stats().analysed == 1));
  assert!(harness.session.snapshot().any_detected);

  // 解释器空闲后下一帧会被分析
  release.send(()).unwrap();
  harness.analyse();
  let stats = harness.session.stats();
  assert_eq!(stats.analysed, 2);
  assert_eq!(stats.dropped, 4);
  harness.session.stop();
}

/// 第 `fail_on` 次 `invoke` 返回错误，其余按检测到目标输出
struct FlakyEngine {
  calls: usize,
  fail_on: usize,
  outputs: [Vec<f32>; 4],
}

impl InferenceEngine for FlakyEngine {
  type Error = std::io::Error;

  fn input_tensor(&self, _: usize) -> Result<TensorDescriptor, Self::Error> {
    Ok(TensorDescriptor {
      shape: vec![1, 4, 4, 3],
      tensor_type: TensorType::UInt8,
    })
  }

  fn copy_input(&mut self, _: &[u8], _: usize) -> Result<(), Self::Error> {
    Ok(())
  }

  fn invoke(&mut self) -> Result<(), Self::Error> {
    self.calls += 1;
    if self.calls == self.fail_on {
      Err(std::io::Error::other("interpreter fault"))
    } else {
      Ok(())
    }
  }

  fn output_tensor(&self, index: usize) -> Result<&[f32], Self::Error> {
    Ok(&self.outputs[index])
  }
}

#[test]
fn inference_failure_clears_detection_until_next_good_frame() {
  let engine = FlakyEngine {
    calls: 0,
    fail_on: 2,
    outputs: [vec![0.9], vec![0.1, 0.1, 0.6, 0.6], vec![1.0], vec![3.0]],
  };
  let harness = Harness::start(InferenceAdapter::with_engine(engine).unwrap());
  harness.steady();
  harness.analyse();
  assert!(harness.session.verdict());
  assert_eq!(harness.session.snapshot().overlay.groups.len(), 1);

  harness.frames.send(frame()).unwrap();
  assert!(wait_until(|| harness.session.stats().failed == 1));
  let snapshot = harness.session.snapshot();
  assert!(!snapshot.any_detected);
  assert!(snapshot.overlay.groups.is_empty());
  assert!(!harness.session.verdict());
  assert_eq!(harness.session.stats().analysed, 1);

  // 失败只影响当前帧
  harness.analyse();
  let snapshot = harness.session.snapshot();
  assert!(snapshot.any_detected);
  assert_eq!(snapshot.overlay.groups.len(), 1);
  assert!(harness.session.verdict());
  let stats = harness.session.stats();
  assert_eq!((stats.analysed, stats.failed), (2, 1));
  harness.session.stop();
}

#[test]
fn verdict_is_sampled_when_shutter_is_pressed() {
  let harness = Harness::start(replay_adapter(vec![detected()]));
  harness.steady();
  harness.analyse();
  assert!(harness.session.verdict());

  // 按下快门后立刻转为横屏，拍摄线程稍后才处理命令
  harness.session.shutter();
  harness.session.set_orientation(Orientation::LandscapeLeft);
  assert!(!harness.session.verdict());

  let deliver = harness.still.wait_pending();
  deliver(Ok(jpeg()));
  match harness.next_event() {
    SessionEvent::ReviewReady(result) => assert!(result.acceptable()),
    other => panic!("unexpected event: {:?}", other),
  }
  harness.session.stop();
}
