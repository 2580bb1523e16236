// 该文件是 DtexCamera 项目的一部分。
// src/capture.rs - 静态拍摄流程编排
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

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// 采集端返回的已编码静态图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillImage {
  data: Box<[u8]>,
}

impl From<Vec<u8>> for StillImage {
  fn from(data: Vec<u8>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl StillImage {
  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn decode(&self) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(&self.data)?.to_rgb8())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
  Off,
  On,
  #[default]
  Auto,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillCodec {
  #[default]
  Jpeg,
  Png,
}

impl StillCodec {
  pub fn image_format(&self) -> image::ImageFormat {
    match self {
      StillCodec::Jpeg => image::ImageFormat::Jpeg,
      StillCodec::Png => image::ImageFormat::Png,
    }
  }
}

/// 每次拍摄请求携带的设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StillCaptureSettings {
  pub codec: StillCodec,
  pub high_resolution: bool,
  pub flash: FlashMode,
}

impl Default for StillCaptureSettings {
  fn default() -> Self {
    Self {
      codec: StillCodec::Jpeg,
      high_resolution: true,
      flash: FlashMode::Auto,
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
  #[error("采集设备错误: {0}")]
  Device(String),
  #[error("拍摄结果没有图像数据")]
  NoImageData,
  #[error("拍摄被取消")]
  Cancelled,
}

/// 拍摄完成回调
pub type StillCallback = Box<dyn FnOnce(Result<StillImage, CaptureError>) + Send + 'static>;

/// 相机采集端的静态拍摄接口
pub trait StillCapture: Send {
  /// 发起异步拍摄，完成后调用 `done`
  fn request_still(&mut self, settings: &StillCaptureSettings, done: StillCallback);
}

/// 最终交给宿主的拍摄结果，创建后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
  image: StillImage,
  acceptable: bool,
  triggered_at: DateTime<Utc>,
}

impl CaptureResult {
  pub fn image(&self) -> &StillImage {
    &self.image
  }

  /// 触发快门瞬间的判定结果
  pub fn acceptable(&self) -> bool {
    self.acceptable
  }

  pub fn triggered_at(&self) -> DateTime<Utc> {
    self.triggered_at
  }

  pub fn into_image(self) -> StillImage {
    self.image
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
  Idle,
  Triggered,
  Reviewing,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OrchestratorError {
  #[error("当前状态 {0:?} 不能触发拍摄")]
  NotIdle(CapturePhase),
  #[error("当前状态 {0:?} 没有待审阅的照片")]
  NotReviewing(CapturePhase),
  #[error("过期的拍摄结果: {0:?}")]
  StaleDelivery(CaptureTicket),
}

#[derive(Debug)]
enum CaptureState {
  Idle,
  Triggered {
    ticket: CaptureTicket,
    verdict: bool,
    triggered_at: DateTime<Utc>,
  },
  Reviewing(CaptureResult),
}

impl CaptureState {
  fn phase(&self) -> CapturePhase {
    match self {
      CaptureState::Idle => CapturePhase::Idle,
      CaptureState::Triggered { .. } => CapturePhase::Triggered,
      CaptureState::Reviewing(_) => CapturePhase::Reviewing,
    }
  }
}

/// 拍摄状态机：Idle → Triggered → (Reviewing | Idle)
///
/// 判定结果在触发时快照，图像稍后异步送达时不再重新采样。
#[derive(Debug)]
pub struct CaptureOrchestrator {
  state: CaptureState,
  next_ticket: u64,
  settings: StillCaptureSettings,
}

impl Default for CaptureOrchestrator {
  fn default() -> Self {
    Self::new(StillCaptureSettings::default())
  }
}

impl CaptureOrchestrator {
  pub fn new(settings: StillCaptureSettings) -> Self {
    Self {
      state: CaptureState::Idle,
      next_ticket: 0,
      settings,
    }
  }

  pub fn phase(&self) -> CapturePhase {
    self.state.phase()
  }

  pub fn settings(&self) -> &StillCaptureSettings {
    &self.settings
  }

  /// 离开 Idle 后冻结检测框叠加层
  pub fn is_overlay_frozen(&self) -> bool {
    !matches!(self.state, CaptureState::Idle)
  }

  /// 正在审阅的照片
  pub fn reviewing(&self) -> Option<&CaptureResult> {
    match &self.state {
      CaptureState::Reviewing(result) => Some(result),
      _ => None,
    }
  }

  pub fn trigger(&mut self, verdict: bool) -> Result<CaptureTicket, OrchestratorError> {
    if !matches!(self.state, CaptureState::Idle) {
      return Err(OrchestratorError::NotIdle(self.phase()));
    }
    self.next_ticket += 1;
    let ticket = CaptureTicket(self.next_ticket);
    info!("快门触发 {:?}, 判定结果: {}", ticket, verdict);
    self.state = CaptureState::Triggered {
      ticket,
      verdict,
      triggered_at: Utc::now(),
    };
    Ok(ticket)
  }

  /// 处理采集端返回的图像
  ///
  /// 成功时进入 Reviewing 并返回结果；失败时丢弃快照并回到 Idle，返回 `Ok(None)`。
  pub fn deliver(
    &mut self,
    ticket: CaptureTicket,
    outcome: Result<StillImage, CaptureError>,
  ) -> Result<Option<&CaptureResult>, OrchestratorError> {
    let (verdict, triggered_at) = match self.state {
      CaptureState::Triggered {
        ticket: pending,
        verdict,
        triggered_at,
      } if pending == ticket => (verdict, triggered_at),
      _ => {
        warn!("丢弃过期的拍摄结果 {:?}", ticket);
        return Err(OrchestratorError::StaleDelivery(ticket));
      }
    };

    let outcome = outcome.and_then(|image| {
      if image.is_empty() {
        Err(CaptureError::NoImageData)
      } else {
        Ok(image)
      }
    });

    match outcome {
      Ok(image) => {
        info!("拍摄完成 {:?}: {} 字节", ticket, image.len());
        self.state = CaptureState::Reviewing(CaptureResult {
          image,
          acceptable: verdict,
          triggered_at,
        });
        Ok(self.reviewing())
      }
      Err(e) => {
        warn!("拍摄失败 {:?}: {}", ticket, e);
        self.state = CaptureState::Idle;
        Ok(None)
      }
    }
  }

  pub fn retake(&mut self) -> Result<(), OrchestratorError> {
    match self.state {
      CaptureState::Reviewing(_) => {
        info!("重新拍摄");
        self.state = CaptureState::Idle;
        Ok(())
      }
      _ => Err(OrchestratorError::NotReviewing(self.phase())),
    }
  }

  pub fn accept(&mut self) -> Result<CaptureResult, OrchestratorError> {
    match std::mem::replace(&mut self.state, CaptureState::Idle) {
      CaptureState::Reviewing(result) => {
        info!("确认照片, 可接受: {}", result.acceptable);
        Ok(result)
      }
      other => {
        let phase = other.phase();
        self.state = other;
        Err(OrchestratorError::NotReviewing(phase))
      }
    }
  }
}
