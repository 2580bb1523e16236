// 该文件是 DtexCamera 项目的一部分。
// src/model/adapter.rs - 推理适配器
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

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  frame::Frame,
  model::{
    DetectionFrame, EngineBuilder, InferenceEngine, OUTPUT_BOXES, OUTPUT_CATEGORIES, OUTPUT_COUNT,
    OUTPUT_SCORES, TensorType, aggregate::AggregateError,
  },
};

const MODEL_INPUT_INDEX: usize = 0;

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("空帧")]
  EmptyFrame,
  #[error("模型输入形状不支持: {0:?}")]
  UnsupportedInput(Vec<usize>),
  #[error("解释器错误: {0}")]
  Engine(Box<dyn std::error::Error + Send + Sync>),
  #[error("输出张量无效: {0}")]
  MalformedOutput(#[from] AggregateError),
}

impl InferenceError {
  fn engine<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    InferenceError::Engine(Box::new(e))
  }
}

struct LoadedModel<E> {
  engine: E,
  input_side: u32,
  tensor_type: TensorType,
}

/// 包装解释器，负责张量布局与输出解析
///
/// 未配置模型或模型加载失败时，推理被整体跳过。
pub struct InferenceAdapter<E> {
  model: Option<LoadedModel<E>>,
}

impl<E> Default for InferenceAdapter<E> {
  fn default() -> Self {
    Self::unconfigured()
  }
}

impl<E> InferenceAdapter<E> {
  pub fn unconfigured() -> Self {
    Self { model: None }
  }

  pub fn is_enabled(&self) -> bool {
    self.model.is_some()
  }

  pub fn input_side(&self) -> Option<u32> {
    self.model.as_ref().map(|m| m.input_side)
  }

  pub fn tensor_type(&self) -> Option<TensorType> {
    self.model.as_ref().map(|m| m.tensor_type)
  }
}

impl<E: InferenceEngine> InferenceAdapter<E> {
  /// 加载模型；失败时记录日志并在本次会话中禁用推理
  pub fn load<B: EngineBuilder<Engine = E>>(builder: Option<B>) -> Self {
    let Some(builder) = builder else {
      info!("未配置模型，跳过目标检测");
      return Self::unconfigured();
    };

    match builder.build() {
      Ok(engine) => Self::with_engine(engine).unwrap_or_else(|e| {
        error!("模型不可用，本次会话禁用推理: {}", e);
        Self::unconfigured()
      }),
      Err(e) => {
        error!("模型加载失败，本次会话禁用推理: {}", e);
        Self::unconfigured()
      }
    }
  }

  pub fn with_engine(engine: E) -> Result<Self, InferenceError> {
    let descriptor = engine
      .input_tensor(MODEL_INPUT_INDEX)
      .map_err(InferenceError::engine)?;
    let input_side = descriptor
      .square_side()
      .ok_or_else(|| InferenceError::UnsupportedInput(descriptor.shape.clone()))?;
    info!(
      "模型输入: {}x{} {:?}",
      input_side, input_side, descriptor.tensor_type
    );
    Ok(Self {
      model: Some(LoadedModel {
        engine,
        input_side,
        tensor_type: descriptor.tensor_type,
      }),
    })
  }

  /// 对单帧执行推理
  ///
  /// 未配置模型时返回 `Ok(None)`。
  pub fn infer(&mut self, frame: &Frame) -> Result<Option<DetectionFrame>, InferenceError> {
    let Some(model) = self.model.as_mut() else {
      return Ok(None);
    };
    if frame.is_empty() {
      return Err(InferenceError::EmptyFrame);
    }

    debug!("设置模型输入");
    let input = frame.to_model_input(model.input_side, model.tensor_type);
    model
      .engine
      .copy_input(input.as_bytes(), MODEL_INPUT_INDEX)
      .map_err(InferenceError::engine)?;

    debug!("执行模型推理");
    model.engine.invoke().map_err(InferenceError::engine)?;

    debug!("获取模型输出");
    let engine = &model.engine;
    let output = move |index| engine.output_tensor(index).map_err(InferenceError::engine);
    let scores = output(OUTPUT_SCORES)?;
    let boxes = output(OUTPUT_BOXES)?;
    let count = output(OUTPUT_COUNT)?.first().copied();
    let categories = output(OUTPUT_CATEGORIES)?;

    let detections = DetectionFrame::from_tensors(scores, boxes, count, categories)?;
    debug!(
      "模型输出 {} 个候选框 (报告数量 {})",
      detections.len(),
      detections.reported_count()
    );
    Ok(Some(detections))
  }
}
