// 该文件是 DtexCamera 项目的一部分。
// src/motion.rs - 设备运动融合滤波
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
use tracing::trace;

use crate::gate::radians_to_degrees;

/// 标准重力加速度 (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// 单极点滤波系数
const SHAKE_DECAY: f64 = 0.9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
  pub x: f64,
  pub y: f64,
  pub z: f64,
}

impl Vector3 {
  pub const fn new(x: f64, y: f64, z: f64) -> Self {
    Self { x, y, z }
  }

  pub fn norm(&self) -> f64 {
    (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
  }
}

impl std::ops::Add for Vector3 {
  type Output = Vector3;

  fn add(self, rhs: Vector3) -> Vector3 {
    Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
  }
}

/// 一次设备运动读数，加速度以 g 为单位
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
  /// 姿态俯仰角（弧度）
  pub pitch: f64,
  pub user_acceleration: Vector3,
  pub gravity: Vector3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionReading {
  pub rotation: f64,
  pub shake_magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterState {
  pub previous_accel_magnitude: f64,
  pub current_accel_magnitude: f64,
  pub filtered_shake: f64,
}

impl Default for FilterState {
  fn default() -> Self {
    Self {
      previous_accel_magnitude: STANDARD_GRAVITY,
      current_accel_magnitude: STANDARD_GRAVITY,
      filtered_shake: 0.0,
    }
  }
}

/// 将加速度变化率做单极点 IIR 滤波，得到抖动幅度
///
/// 滤波对象是相邻两次加速度幅值之差，而不是幅值本身，
/// 因此静止倾斜不会产生抖动。滤波器没有内部时钟，按输入节奏处理。
#[derive(Debug, Clone, Default)]
pub struct MotionFusionFilter {
  state: FilterState,
  rotation: f64,
}

impl MotionFusionFilter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_state(state: FilterState) -> Self {
    Self {
      state,
      rotation: 0.0,
    }
  }

  pub fn ingest(&mut self, sample: &MotionSample) -> MotionReading {
    self.rotation = sample.pitch;

    let raw = (sample.user_acceleration + sample.gravity).norm() * STANDARD_GRAVITY;
    self.state.current_accel_magnitude = raw;
    let delta = raw - self.state.previous_accel_magnitude;
    self.state.filtered_shake = self.state.filtered_shake * SHAKE_DECAY + delta;
    self.state.previous_accel_magnitude = raw;

    trace!(
      "俯仰 {:.1}°, 加速度 {:.3}, 抖动 {:.4}",
      radians_to_degrees(self.rotation),
      raw,
      self.state.filtered_shake
    );

    self.reading()
  }

  pub fn reading(&self) -> MotionReading {
    MotionReading {
      rotation: self.rotation,
      shake_magnitude: self.state.filtered_shake,
    }
  }

  pub fn state(&self) -> &FilterState {
    &self.state
  }

  /// 子系统重启时恢复初始状态
  pub fn reset(&mut self) {
    *self = Self::default();
  }
}
