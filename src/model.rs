// 该文件是 DtexCamera 项目的一部分。
// src/model.rs - 推理引擎契约与检测结果定义
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

/// 输出张量槽位，顺序固定
pub const OUTPUT_SCORES: usize = 0;
pub const OUTPUT_BOXES: usize = 1;
pub const OUTPUT_COUNT: usize = 2;
pub const OUTPUT_CATEGORIES: usize = 3;
pub const OUTPUT_TENSOR_NUM: usize = 4;

/// 每个检测框的坐标数量 (ymin, xmin, ymax, xmax)
pub const BOX_COORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorType {
  #[serde(alias = "u8")]
  UInt8,
  #[serde(alias = "f32")]
  Float32,
}

impl TensorType {
  pub fn byte_width(&self) -> usize {
    match self {
      TensorType::UInt8 => 1,
      TensorType::Float32 => 4,
    }
  }
}

/// 输入张量描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
  pub shape: Vec<usize>,
  pub tensor_type: TensorType,
}

impl TensorDescriptor {
  /// 从 [1, side, side, 3] 形状中取出边长
  pub fn square_side(&self) -> Option<u32> {
    match self.shape.as_slice() {
      [1, h, w, 3] if h == w && *h > 0 => u32::try_from(*h).ok(),
      _ => None,
    }
  }

  pub fn byte_len(&self) -> usize {
    self.shape.iter().product::<usize>() * self.tensor_type.byte_width()
  }
}

/// 神经网络解释器的不透明接口
///
/// 解释器不可重入：同一时刻最多只有一个推理调用。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn input_tensor(&self, index: usize) -> Result<TensorDescriptor, Self::Error>;
  fn copy_input(&mut self, data: &[u8], index: usize) -> Result<(), Self::Error>;
  fn invoke(&mut self) -> Result<(), Self::Error>;
  fn output_tensor(&self, index: usize) -> Result<&[f32], Self::Error>;
}

/// 从模型资源加载解释器
pub trait EngineBuilder {
  type Engine: InferenceEngine;
  type Error: std::error::Error + Send + Sync + 'static;

  fn build(self) -> Result<Self::Engine, Self::Error>;
}

/// 单个候选检测框，坐标为相对模型参考系的归一化值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
  pub ymin: f32,
  pub xmin: f32,
  pub ymax: f32,
  pub xmax: f32,
  pub score: f32,
  /// 模型输出的原始类别值
  pub category: f32,
}

impl DetectionBox {
  pub fn width(&self) -> f32 {
    self.xmax - self.xmin
  }

  pub fn height(&self) -> f32 {
    self.ymax - self.ymin
  }
}

/// 一次推理的全部输出
///
/// 构造时已校验：分数、类别与框数量一致。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFrame {
  scores: Box<[f32]>,
  boxes: Box<[f32]>,
  categories: Box<[f32]>,
  count: usize,
}

impl DetectionFrame {
  pub fn from_tensors(
    scores: &[f32],
    boxes: &[f32],
    count: Option<f32>,
    categories: &[f32],
  ) -> Result<Self, aggregate::AggregateError> {
    aggregate::check_cardinality(scores, boxes, categories)?;
    let count = count
      .filter(|c| c.is_finite() && *c >= 0.0)
      .map(|c| c as usize)
      .unwrap_or(scores.len());
    Ok(Self {
      scores: scores.into(),
      boxes: boxes.into(),
      categories: categories.into(),
      count,
    })
  }

  pub fn scores(&self) -> &[f32] {
    &self.scores
  }

  pub fn boxes(&self) -> &[f32] {
    &self.boxes
  }

  pub fn categories(&self) -> &[f32] {
    &self.categories
  }

  /// 模型报告的检测数量，仅作记录
  pub fn reported_count(&self) -> usize {
    self.count
  }

  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  pub fn detection(&self, index: usize) -> Option<DetectionBox> {
    let score = *self.scores.get(index)?;
    let coords = self.boxes.get(index * BOX_COORDS..(index + 1) * BOX_COORDS)?;
    let category = *self.categories.get(index)?;
    Some(DetectionBox {
      ymin: coords[0],
      xmin: coords[1],
      ymax: coords[2],
      xmax: coords[3],
      score,
      category,
    })
  }

  pub fn detections(&self) -> impl Iterator<Item = DetectionBox> + '_ {
    (0..self.len()).filter_map(|i| self.detection(i))
  }

  /// 按类别分组排序
  pub fn rank(&self, config: &aggregate::AggregateConfig) -> aggregate::RankedGroups {
    aggregate::rank_groups(&self.scores, &self.boxes, &self.categories, config)
  }
}

pub mod adapter;
pub mod aggregate;
#[cfg(feature = "model_replay")]
pub mod replay;

pub use self::adapter::{InferenceAdapter, InferenceError};
pub use self::aggregate::{
  AggregateConfig, AggregateError, DetectionGroup, PALETTE, RankedGroups, aggregate,
};
#[cfg(feature = "model_replay")]
pub use self::replay::{ReplayEngine, ReplayEngineBuilder, ReplayError};
