// 该文件是 DtexCamera 项目的一部分。
// src/config.rs - 管线配置
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

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  capture::StillCaptureSettings,
  gate::GateThresholds,
  model::{AggregateConfig, PALETTE},
};

const DEFAULT_MOTION_INTERVAL_MS: u64 = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置格式错误: {0}")]
  FormatError(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 所有字段缺省时取默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// 模型地址，例如 `replay:///path/model.json`；缺省时不做检测
  pub model: Option<Url>,
  pub gate: GateThresholds,
  pub aggregate: AggregateConfig,
  pub still: StillCaptureSettings,
  pub motion_interval_ms: u64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      model: None,
      gate: GateThresholds::default(),
      aggregate: AggregateConfig::default(),
      still: StillCaptureSettings::default(),
      motion_interval_ms: DEFAULT_MOTION_INTERVAL_MS,
    }
  }
}

impl PipelineConfig {
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: PipelineConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
    info!("读取配置文件: {}", path.display());
    let data = std::fs::read_to_string(path)?;
    Self::from_json_str(&data)
  }

  pub fn motion_interval(&self) -> Duration {
    Duration::from_millis(self.motion_interval_ms)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.motion_interval_ms == 0 {
      return Err(ConfigError::Invalid("motion_interval_ms 必须大于 0".into()));
    }
    if !(0.0..=1.0).contains(&self.aggregate.min_score) {
      return Err(ConfigError::Invalid(format!(
        "aggregate.min_score 超出范围: {}",
        self.aggregate.min_score
      )));
    }
    // 每个保留的组需要一个不同的颜色
    if self.aggregate.max_groups > PALETTE.len() {
      return Err(ConfigError::Invalid(format!(
        "aggregate.max_groups 不能超过 {}: {}",
        PALETTE.len(),
        self.aggregate.max_groups
      )));
    }
    if !self.gate.max_shake.is_finite() || !self.gate.min_rotation.is_finite() {
      return Err(ConfigError::Invalid("gate 阈值必须为有限值".into()));
    }
    Ok(())
  }
}
