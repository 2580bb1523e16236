// 该文件是 DtexCamera 项目的一部分。
// src/task.rs - 相机会话：帧分析、运动融合与拍摄三条并发流水线
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

use std::{
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  capture::{
    CaptureError, CaptureOrchestrator, CaptureResult, CaptureTicket, StillCapture, StillImage,
  },
  config::PipelineConfig,
  frame::Frame,
  gate::{GateThresholds, Orientation},
  model::{AggregateConfig, InferenceAdapter, InferenceEngine, RankedGroups},
  motion::{MotionFusionFilter, MotionReading, MotionSample},
};

// 生产者通道的轮询间隔，用于及时响应停止
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("无法启动线程 {0}: {1}")]
  Spawn(&'static str, std::io::Error),
}

/// 会话发给宿主的事件
#[derive(Debug, Clone)]
pub enum SessionEvent {
  /// 照片已送达，等待用户确认或重拍
  ReviewReady(CaptureResult),
  /// 拍摄失败，已回到预览
  CaptureFailed(CaptureError),
  /// 用户确认，最终结果
  Accepted(CaptureResult),
}

/// 最近一次完成的分析结果
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
  pub orientation: Orientation,
  pub any_detected: bool,
  pub overlay: RankedGroups,
  pub motion: MotionReading,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
  /// 到达的帧
  pub received: u64,
  /// 因推理繁忙被丢弃的帧
  pub dropped: u64,
  /// 推理失败的帧
  pub failed: u64,
  /// 完成分析的帧
  pub analysed: u64,
  /// 运动样本
  pub motion_samples: u64,
}

#[derive(Default)]
struct Counters {
  received: AtomicU64,
  dropped: AtomicU64,
  failed: AtomicU64,
  analysed: AtomicU64,
  motion_samples: AtomicU64,
}

impl Counters {
  fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  fn snapshot(&self) -> SessionStats {
    SessionStats {
      received: self.received.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
      analysed: self.analysed.load(Ordering::Relaxed),
      motion_samples: self.motion_samples.load(Ordering::Relaxed),
    }
  }
}

struct Shared {
  live: Mutex<LiveSnapshot>,
  overlay_frozen: AtomicBool,
  stopped: AtomicBool,
  counters: Counters,
  gate: GateThresholds,
}

impl Shared {
  fn live(&self) -> MutexGuard<'_, LiveSnapshot> {
    self.live.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::Acquire)
  }

  fn verdict(&self) -> bool {
    let live = self.live();
    self.gate.is_acceptable(
      live.orientation,
      live.any_detected,
      live.motion.rotation,
      live.motion.shake_magnitude,
    )
  }
}

/// 解释器占用标记：同一时刻只允许一个推理在进行
#[derive(Default)]
struct InferenceSlot {
  busy: AtomicBool,
}

impl InferenceSlot {
  /// 非阻塞获取，繁忙时返回 None
  fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
    self
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| SlotGuard(Arc::clone(self)))
  }
}

struct SlotGuard(Arc<InferenceSlot>);

impl Drop for SlotGuard {
  fn drop(&mut self) {
    self.0.busy.store(false, Ordering::Release);
  }
}

enum CaptureCommand {
  /// 携带按下快门瞬间的判定
  Shutter(bool),
  Delivered(CaptureTicket, Result<StillImage, CaptureError>),
  Retake,
  Accept,
  Stop,
}

/// 一个相机画面的生命周期：进入时创建，离开时 `stop`
pub struct CameraSession {
  shared: Arc<Shared>,
  commands: Sender<CaptureCommand>,
  handles: Vec<JoinHandle<()>>,
}

impl CameraSession {
  /// 启动会话
  ///
  /// `frames` 与 `motion` 由采集端和运动传感端持续写入，
  /// 返回的接收端用于接收拍摄事件。
  pub fn start<E, S>(
    config: &PipelineConfig,
    adapter: InferenceAdapter<E>,
    still: S,
    frames: Receiver<Frame>,
    motion: Receiver<MotionSample>,
  ) -> Result<(Self, Receiver<SessionEvent>), SessionError>
  where
    E: InferenceEngine + Send + 'static,
    S: StillCapture + 'static,
  {
    let shared = Arc::new(Shared {
      live: Mutex::new(LiveSnapshot::default()),
      overlay_frozen: AtomicBool::new(false),
      stopped: AtomicBool::new(false),
      counters: Counters::default(),
      gate: config.gate,
    });
    let (commands, command_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();

    let mut session = CameraSession {
      shared,
      commands,
      handles: Vec::with_capacity(4),
    };

    let worker = if adapter.is_enabled() {
      let (work_tx, work_rx) = mpsc::channel();
      let shared = Arc::clone(&session.shared);
      let aggregate = config.aggregate;
      session.spawn("dtex-inference", move || {
        run_inference(shared, adapter, aggregate, work_rx)
      })?;
      Some(work_tx)
    } else {
      info!("推理未启用，预览帧不做分析");
      None
    };

    let shared = Arc::clone(&session.shared);
    session.spawn("dtex-frames", move || dispatch_frames(shared, frames, worker))?;

    let shared = Arc::clone(&session.shared);
    session.spawn("dtex-motion", move || run_motion(shared, motion))?;

    let shared = Arc::clone(&session.shared);
    let orchestrator = CaptureOrchestrator::new(config.still);
    let command_tx = session.commands.clone();
    session.spawn("dtex-capture", move || {
      run_capture(shared, orchestrator, still, command_rx, command_tx, event_tx)
    })?;

    info!("相机会话已启动");
    Ok((session, event_rx))
  }

  fn spawn<F>(&mut self, name: &'static str, f: F) -> Result<(), SessionError>
  where
    F: FnOnce() + Send + 'static,
  {
    let handle = thread::Builder::new()
      .name(name.to_string())
      .spawn(f)
      .map_err(|e| SessionError::Spawn(name, e))?;
    self.handles.push(handle);
    Ok(())
  }

  pub fn set_orientation(&self, orientation: Orientation) {
    self.shared.live().orientation = orientation;
  }

  /// 当前可接受性判定，基于最近一次完成的检测与运动结果
  pub fn verdict(&self) -> bool {
    self.shared.verdict()
  }

  pub fn snapshot(&self) -> LiveSnapshot {
    self.shared.live().clone()
  }

  pub fn stats(&self) -> SessionStats {
    self.shared.counters.snapshot()
  }

  pub fn is_overlay_frozen(&self) -> bool {
    self.shared.overlay_frozen.load(Ordering::Acquire)
  }

  /// 按下快门；判定在调用时采样，不受拍摄线程排队影响
  pub fn shutter(&self) {
    let verdict = self.shared.verdict();
    let _ = self.commands.send(CaptureCommand::Shutter(verdict));
  }

  pub fn retake(&self) {
    let _ = self.commands.send(CaptureCommand::Retake);
  }

  pub fn accept(&self) {
    let _ = self.commands.send(CaptureCommand::Accept);
  }

  /// 停止所有流水线；正在进行的推理允许完成，但结果被丢弃
  pub fn stop(mut self) {
    self.shutdown();
  }

  fn shutdown(&mut self) {
    if self.handles.is_empty() {
      return;
    }
    info!("停止相机会话");
    self.shared.stopped.store(true, Ordering::Release);
    let _ = self.commands.send(CaptureCommand::Stop);
    for handle in self.handles.drain(..) {
      let name = handle.thread().name().unwrap_or("?").to_string();
      if handle.join().is_err() {
        warn!("线程 {} 异常退出", name);
      }
    }
    let stats = self.stats();
    info!(
      "会话统计: 到达 {} 帧, 分析 {} 帧, 丢弃 {} 帧, 失败 {} 帧, 运动样本 {}",
      stats.received, stats.analysed, stats.dropped, stats.failed, stats.motion_samples
    );
  }
}

impl Drop for CameraSession {
  fn drop(&mut self) {
    self.shutdown();
  }
}

fn dispatch_frames(
  shared: Arc<Shared>,
  frames: Receiver<Frame>,
  worker: Option<Sender<(Frame, SlotGuard)>>,
) {
  let slot = Arc::new(InferenceSlot::default());
  loop {
    if shared.is_stopped() {
      break;
    }
    let frame = match frames.recv_timeout(POLL_INTERVAL) {
      Ok(frame) => frame,
      Err(RecvTimeoutError::Timeout) => continue,
      Err(RecvTimeoutError::Disconnected) => break,
    };
    Counters::bump(&shared.counters.received);

    let Some(worker) = worker.as_ref() else {
      continue;
    };
    match slot.try_acquire() {
      Some(guard) => {
        if worker.send((frame, guard)).is_err() {
          break;
        }
      }
      None => {
        Counters::bump(&shared.counters.dropped);
        debug!("推理繁忙，丢弃当前帧");
      }
    }
  }
  debug!("帧分发结束");
}

fn run_inference<E: InferenceEngine>(
  shared: Arc<Shared>,
  mut adapter: InferenceAdapter<E>,
  aggregate: AggregateConfig,
  work: Receiver<(Frame, SlotGuard)>,
) {
  for (frame, guard) in work {
    let now = std::time::Instant::now();
    let outcome = adapter.infer(&frame);
    let elapsed = now.elapsed();
    drop(guard);
    if shared.is_stopped() {
      break;
    }

    let frozen = shared.overlay_frozen.load(Ordering::Acquire);
    match outcome {
      Ok(Some(detections)) => {
        let ranked = detections.rank(&aggregate);
        debug!(
          "推理完成，耗时: {:.2?}, {} 组, {} 个框",
          elapsed,
          ranked.groups.len(),
          ranked.box_count()
        );
        let mut live = shared.live();
        live.any_detected = ranked.any_detected;
        if !frozen {
          live.overlay = ranked;
        }
        Counters::bump(&shared.counters.analysed);
      }
      Ok(None) => {}
      Err(e) => {
        warn!("推理失败，跳过当前帧: {}", e);
        let mut live = shared.live();
        live.any_detected = false;
        if !frozen {
          live.overlay = RankedGroups::default();
        }
        Counters::bump(&shared.counters.failed);
      }
    }
  }
  debug!("推理线程结束");
}

fn run_motion(shared: Arc<Shared>, samples: Receiver<MotionSample>) {
  let mut filter = MotionFusionFilter::new();
  loop {
    if shared.is_stopped() {
      break;
    }
    let sample = match samples.recv_timeout(POLL_INTERVAL) {
      Ok(sample) => sample,
      Err(RecvTimeoutError::Timeout) => continue,
      Err(RecvTimeoutError::Disconnected) => break,
    };
    let reading = filter.ingest(&sample);
    shared.live().motion = reading;
    Counters::bump(&shared.counters.motion_samples);
  }
  debug!("运动融合结束");
}

fn run_capture<S: StillCapture>(
  shared: Arc<Shared>,
  mut orchestrator: CaptureOrchestrator,
  mut still: S,
  commands: Receiver<CaptureCommand>,
  command_tx: Sender<CaptureCommand>,
  events: Sender<SessionEvent>,
) {
  let set_frozen = |frozen: bool| shared.overlay_frozen.store(frozen, Ordering::Release);

  for command in commands {
    if shared.is_stopped() {
      break;
    }
    match command {
      CaptureCommand::Shutter(verdict) => {
        match orchestrator.trigger(verdict) {
          Ok(ticket) => {
            set_frozen(true);
            let reply = command_tx.clone();
            still.request_still(
              orchestrator.settings(),
              Box::new(move |outcome| {
                // 会话结束后的回调被静默丢弃
                let _ = reply.send(CaptureCommand::Delivered(ticket, outcome));
              }),
            );
          }
          Err(e) => warn!("忽略快门: {}", e),
        }
      }
      CaptureCommand::Delivered(ticket, outcome) => {
        let failure = outcome.as_ref().err().cloned();
        match orchestrator.deliver(ticket, outcome) {
          Ok(Some(result)) => {
            let _ = events.send(SessionEvent::ReviewReady(result.clone()));
          }
          Ok(None) => {
            set_frozen(false);
            let error = failure.unwrap_or(CaptureError::NoImageData);
            let _ = events.send(SessionEvent::CaptureFailed(error));
          }
          Err(e) => debug!("{}", e),
        }
      }
      CaptureCommand::Retake => match orchestrator.retake() {
        Ok(()) => set_frozen(false),
        Err(e) => warn!("忽略重拍: {}", e),
      },
      CaptureCommand::Accept => match orchestrator.accept() {
        Ok(result) => {
          set_frozen(false);
          let _ = events.send(SessionEvent::Accepted(result));
        }
        Err(e) => warn!("忽略确认: {}", e),
      },
      CaptureCommand::Stop => break,
    }
  }
  debug!("拍摄线程结束");
}
