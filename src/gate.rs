// 该文件是 DtexCamera 项目的一部分。
// src/gate.rs - 拍摄可接受性判定
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

use serde::{Deserialize, Serialize};

const DEFAULT_MIN_ROTATION: f64 = 0.5;
const DEFAULT_MAX_SHAKE: f64 = 0.3;

pub fn radians_to_degrees(radians: f64) -> f64 {
  radians * 180.0 / std::f64::consts::PI
}

/// 设备物理朝向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
  #[default]
  Portrait,
  LandscapeLeft,
  LandscapeRight,
  PortraitUpsideDown,
  FaceUp,
  FaceDown,
  Unknown,
}

impl Orientation {
  /// 映射为角度；平放与未知朝向按竖屏处理
  pub fn degrees(&self) -> i32 {
    match self {
      Orientation::Portrait => 0,
      Orientation::LandscapeLeft => -90,
      Orientation::LandscapeRight => 90,
      Orientation::PortraitUpsideDown => 180,
      Orientation::FaceUp | Orientation::FaceDown | Orientation::Unknown => 0,
    }
  }
}

impl std::str::FromStr for Orientation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "portrait" => Ok(Orientation::Portrait),
      "landscape-left" => Ok(Orientation::LandscapeLeft),
      "landscape-right" => Ok(Orientation::LandscapeRight),
      "portrait-upside-down" => Ok(Orientation::PortraitUpsideDown),
      "face-up" => Ok(Orientation::FaceUp),
      "face-down" => Ok(Orientation::FaceDown),
      "unknown" => Ok(Orientation::Unknown),
      other => Err(format!("未知的设备朝向: {}", other)),
    }
  }
}

/// 判定阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
  /// 俯仰角下限（弧度），约 28.6°
  pub min_rotation: f64,
  pub max_shake: f64,
}

impl Default for GateThresholds {
  fn default() -> Self {
    Self {
      min_rotation: DEFAULT_MIN_ROTATION,
      max_shake: DEFAULT_MAX_SHAKE,
    }
  }
}

impl GateThresholds {
  pub fn is_acceptable(
    &self,
    orientation: Orientation,
    any_detected: bool,
    rotation: f64,
    shake_magnitude: f64,
  ) -> bool {
    orientation.degrees() == 0
      && any_detected
      && rotation > self.min_rotation
      && shake_magnitude < self.max_shake
  }
}

/// 使用默认阈值判定
pub fn is_acceptable(
  orientation: Orientation,
  any_detected: bool,
  rotation: f64,
  shake_magnitude: f64,
) -> bool {
  GateThresholds::default().is_acceptable(orientation, any_detected, rotation, shake_magnitude)
}
