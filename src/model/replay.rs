// 该文件是 DtexCamera 项目的一部分。
// src/model/replay.rs - 回放式解释器
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

//! 按顺序回放录制好的输出张量的解释器。
//!
//! 模型文件为 JSON：
//!
//! ```json
//! {
//!   "input": { "size": 512, "type": "uint8" },
//!   "frames": [
//!     { "scores": [0.9], "boxes": [0.1, 0.1, 0.6, 0.6], "count": 1, "categories": [0] }
//!   ]
//! }
//! ```
//!
//! 每次 `invoke` 取下一帧输出，到末尾后从头循环。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{
    EngineBuilder, InferenceEngine, OUTPUT_BOXES, OUTPUT_CATEGORIES, OUTPUT_COUNT, OUTPUT_SCORES,
    OUTPUT_TENSOR_NUM, TensorDescriptor, TensorType,
  },
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型文件格式错误: {0}")]
  ModelFormatError(#[from] serde_json::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型没有录制任何输出")]
  NoFrames,
  #[error("张量索引越界: {0}")]
  TensorIndex(usize),
  #[error("输入大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  InputSizeMismatch { expected: usize, actual: usize },
  #[error("尚未设置输入")]
  MissingInput,
  #[error("尚未执行推理")]
  NotInvoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayInput {
  pub size: usize,
  #[serde(rename = "type")]
  pub tensor_type: TensorType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFrame {
  pub scores: Vec<f32>,
  pub boxes: Vec<f32>,
  #[serde(default)]
  pub count: Option<f32>,
  pub categories: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayModel {
  pub input: ReplayInput,
  pub frames: Vec<ReplayFrame>,
}

pub struct ReplayEngine {
  descriptor: TensorDescriptor,
  frames: Vec<[Box<[f32]>; OUTPUT_TENSOR_NUM]>,
  cursor: usize,
  has_input: bool,
  current: Option<usize>,
}

impl ReplayEngine {
  pub fn new(model: ReplayModel) -> Result<Self, ReplayError> {
    if model.frames.is_empty() {
      return Err(ReplayError::NoFrames);
    }
    let descriptor = TensorDescriptor {
      shape: vec![1, model.input.size, model.input.size, 3],
      tensor_type: model.input.tensor_type,
    };
    let frames = model
      .frames
      .into_iter()
      .map(|f| {
        let count = f.count.unwrap_or(f.scores.len() as f32);
        [
          f.scores.into_boxed_slice(),
          f.boxes.into_boxed_slice(),
          vec![count].into_boxed_slice(),
          f.categories.into_boxed_slice(),
        ]
      })
      .collect();
    Ok(Self {
      descriptor,
      frames,
      cursor: 0,
      has_input: false,
      current: None,
    })
  }

  pub fn from_path(path: &Path) -> Result<Self, ReplayError> {
    info!("加载模型文件: {}", path.display());
    let data = std::fs::read(path)?;
    debug!("模型文件大小: {:.2} KB", data.len() as f64 / 1024.0);
    let model: ReplayModel = serde_json::from_slice(&data)?;
    Self::new(model)
  }

  pub fn frame_num(&self) -> usize {
    self.frames.len()
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = ReplayError;

  fn input_tensor(&self, index: usize) -> Result<TensorDescriptor, ReplayError> {
    if index != 0 {
      return Err(ReplayError::TensorIndex(index));
    }
    Ok(self.descriptor.clone())
  }

  fn copy_input(&mut self, data: &[u8], index: usize) -> Result<(), ReplayError> {
    if index != 0 {
      return Err(ReplayError::TensorIndex(index));
    }
    let expected = self.descriptor.byte_len();
    if data.len() != expected {
      return Err(ReplayError::InputSizeMismatch {
        expected,
        actual: data.len(),
      });
    }
    self.has_input = true;
    Ok(())
  }

  fn invoke(&mut self) -> Result<(), ReplayError> {
    if !self.has_input {
      return Err(ReplayError::MissingInput);
    }
    self.has_input = false;
    self.current = Some(self.cursor);
    self.cursor = (self.cursor + 1) % self.frames.len();
    Ok(())
  }

  fn output_tensor(&self, index: usize) -> Result<&[f32], ReplayError> {
    let current = self.current.ok_or(ReplayError::NotInvoked)?;
    match index {
      OUTPUT_SCORES | OUTPUT_BOXES | OUTPUT_COUNT | OUTPUT_CATEGORIES => {
        Ok(&self.frames[current][index])
      }
      _ => Err(ReplayError::TensorIndex(index)),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ReplayEngineBuilder {
  model_path: PathBuf,
}

impl FromUrlWithScheme for ReplayEngineBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngineBuilder {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }
    Ok(ReplayEngineBuilder {
      model_path: PathBuf::from(url.path()),
    })
  }
}

impl ReplayEngineBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
    }
  }
}

impl EngineBuilder for ReplayEngineBuilder {
  type Engine = ReplayEngine;
  type Error = ReplayError;

  fn build(self) -> Result<ReplayEngine, ReplayError> {
    ReplayEngine::from_path(&self.model_path)
  }
}
