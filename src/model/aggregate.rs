// 该文件是 DtexCamera 项目的一部分。
// src/model/aggregate.rs - 检测结果分组与排序
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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{BOX_COORDS, DetectionBox};

const DEFAULT_MAX_GROUPS: usize = 5;
const DEFAULT_MAX_BOXES_PER_GROUP: usize = 5;
const DEFAULT_MIN_SCORE: f32 = 0.1;

/// 按组排名分配的绘制颜色
pub const PALETTE: [[u8; 3]; 5] = [
  [255, 0, 0],   // 红
  [0, 255, 0],   // 绿
  [0, 0, 255],   // 蓝
  [255, 165, 0], // 橙
  [128, 0, 128], // 紫
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AggregateError {
  #[error("检测框坐标数量 {boxes} 不是 4 的倍数")]
  RaggedBoxes { boxes: usize },
  #[error("输出数量不一致: 分数 {scores}, 框 {boxes}, 类别 {categories}")]
  CardinalityMismatch {
    scores: usize,
    boxes: usize,
    categories: usize,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
  pub max_groups: usize,
  pub max_boxes_per_group: usize,
  pub min_score: f32,
}

impl Default for AggregateConfig {
  fn default() -> Self {
    Self {
      max_groups: DEFAULT_MAX_GROUPS,
      max_boxes_per_group: DEFAULT_MAX_BOXES_PER_GROUP,
      min_score: DEFAULT_MIN_SCORE,
    }
  }
}

impl AggregateConfig {
  pub fn aggregate(
    &self,
    scores: &[f32],
    boxes: &[f32],
    categories: &[f32],
  ) -> Result<RankedGroups, AggregateError> {
    check_cardinality(scores, boxes, categories)?;
    Ok(rank_groups(scores, boxes, categories, self))
  }
}

/// 同一类别的检测框
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionGroup {
  /// 组内首个检测的原始类别值
  pub category: f32,
  pub color: [u8; 3],
  pub max_score: f32,
  pub boxes: Vec<DetectionBox>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedGroups {
  pub groups: Vec<DetectionGroup>,
  pub any_detected: bool,
}

impl RankedGroups {
  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  pub fn box_count(&self) -> usize {
    self.groups.iter().map(|g| g.boxes.len()).sum()
  }
}

/// 使用默认阈值分组排序
pub fn aggregate(
  scores: &[f32],
  boxes: &[f32],
  categories: &[f32],
) -> Result<RankedGroups, AggregateError> {
  AggregateConfig::default().aggregate(scores, boxes, categories)
}

pub(crate) fn check_cardinality(
  scores: &[f32],
  boxes: &[f32],
  categories: &[f32],
) -> Result<(), AggregateError> {
  if boxes.len() % BOX_COORDS != 0 {
    return Err(AggregateError::RaggedBoxes { boxes: boxes.len() });
  }
  let box_num = boxes.len() / BOX_COORDS;
  if scores.len() != categories.len() || scores.len() != box_num {
    return Err(AggregateError::CardinalityMismatch {
      scores: scores.len(),
      boxes: box_num,
      categories: categories.len(),
    });
  }
  Ok(())
}

// -0.0 与 0.0 视为同一类别
fn category_key(category: f32) -> u32 {
  if category == 0.0 {
    0.0f32.to_bits()
  } else {
    category.to_bits()
  }
}

/// 调用方保证三个数组数量一致
pub(crate) fn rank_groups(
  scores: &[f32],
  boxes: &[f32],
  categories: &[f32],
  config: &AggregateConfig,
) -> RankedGroups {
  // 按首次出现顺序分组
  let mut slots: HashMap<u32, usize> = HashMap::new();
  let mut grouped: Vec<(f32, f32, Vec<usize>)> = Vec::new();
  for (index, &category) in categories.iter().enumerate() {
    let score = scores[index];
    let slot = *slots.entry(category_key(category)).or_insert_with(|| {
      grouped.push((category, f32::NEG_INFINITY, Vec::new()));
      grouped.len() - 1
    });
    let (_, max_score, members) = &mut grouped[slot];
    *max_score = max_score.max(score);
    members.push(index);
  }

  // 稳定排序：最高分相同时先出现的类别在前
  grouped.sort_by(|a, b| b.1.total_cmp(&a.1));
  // 颜色按排名分配，组数不超过调色板大小
  grouped.truncate(config.max_groups.min(PALETTE.len()));

  let mut any_detected = false;
  let groups = grouped
    .into_iter()
    .enumerate()
    .map(|(rank, (category, max_score, mut members))| {
      members.retain(|&i| scores[i] > config.min_score);
      members.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
      members.truncate(config.max_boxes_per_group);
      any_detected |= !members.is_empty();

      let kept = members
        .into_iter()
        .map(|i| {
          let c = &boxes[i * BOX_COORDS..(i + 1) * BOX_COORDS];
          DetectionBox {
            ymin: c[0],
            xmin: c[1],
            ymax: c[2],
            xmax: c[3],
            score: scores[i],
            category: categories[i],
          }
        })
        .collect();

      DetectionGroup {
        category,
        color: PALETTE[rank % PALETTE.len()],
        max_score,
        boxes: kept,
      }
    })
    .collect::<Vec<_>>();

  debug!(
    "分组完成: {} 组, 有效检测: {}",
    groups.len(),
    any_detected
  );

  RankedGroups {
    groups,
    any_detected,
  }
}
