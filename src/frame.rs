// 该文件是 DtexCamera 项目的一部分。
// src/frame.rs - 相机帧与模型输入张量定义
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

use image::{DynamicImage, RgbImage, imageops::FilterType};

use crate::model::TensorType;

const RGB_CHANNELS: usize = 3;

// 浮点模型的输入归一化参数：(v - mean) / std
const FLOAT_INPUT_MEAN: f32 = 127.5;
const FLOAT_INPUT_STD: f32 = 127.5;

/// 相机采集到的一帧图像
///
/// 帧由采集层持有，推理时仅被借用，不会被保留。
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self { image }
  }
}

impl From<DynamicImage> for Frame {
  fn from(image: DynamicImage) -> Self {
    Self {
      image: image.to_rgb8(),
    }
  }
}

impl Frame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  /// 帧内最大居中正方形的区域 (x, y, side)
  pub fn centered_square(&self) -> (u32, u32, u32) {
    let (w, h) = (self.width(), self.height());
    let side = w.min(h);
    ((w - side) / 2, (h - side) / 2, side)
  }

  /// 裁剪为居中正方形并缩放到模型输入尺寸
  pub fn to_model_input(&self, side: u32, tensor_type: TensorType) -> ModelInput {
    let (x, y, crop) = self.centered_square();
    let cropped = image::imageops::crop_imm(&self.image, x, y, crop, crop).to_image();
    let resized = if crop == side {
      cropped
    } else {
      image::imageops::resize(&cropped, side, side, FilterType::Triangle)
    };
    ModelInput::from_rgb(resized, tensor_type)
  }
}

/// 模型输入张量，NHWC 排列的正方形 RGB 数据
///
/// 字节编码由模型声明的输入类型决定：
/// - `UInt8`：每通道一个字节
/// - `Float32`：每通道一个归一化后的 f32（本机字节序）
#[derive(Debug, Clone)]
pub struct ModelInput {
  side: u32,
  tensor_type: TensorType,
  data: Box<[u8]>,
}

impl ModelInput {
  fn from_rgb(image: RgbImage, tensor_type: TensorType) -> Self {
    let side = image.width();
    let raw = image.into_raw();
    let data = match tensor_type {
      TensorType::UInt8 => raw.into_boxed_slice(),
      TensorType::Float32 => raw
        .iter()
        .flat_map(|&v| ((v as f32 - FLOAT_INPUT_MEAN) / FLOAT_INPUT_STD).to_ne_bytes())
        .collect(),
    };
    Self {
      side,
      tensor_type,
      data,
    }
  }

  pub fn side(&self) -> u32 {
    self.side
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn tensor_type(&self) -> TensorType {
    self.tensor_type
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn byte_len(&self) -> usize {
    self.data.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn striped(width: u32, height: u32) -> Frame {
    Frame::from(RgbImage::from_fn(width, height, |x, _| {
      if x < width / 4 || x >= width - width / 4 {
        Rgb([255, 0, 0])
      } else {
        Rgb([0, 0, 255])
      }
    }))
  }

  #[test]
  fn centered_square_of_landscape_frame() {
    let frame = striped(640, 480);
    assert_eq!(frame.centered_square(), (80, 0, 480));
  }

  #[test]
  fn centered_square_of_portrait_frame() {
    let frame = Frame::from(RgbImage::new(480, 640));
    assert_eq!(frame.centered_square(), (0, 80, 480));
  }

  #[test]
  fn uint8_input_has_one_byte_per_channel() {
    let frame = striped(64, 48);
    let input = frame.to_model_input(32, TensorType::UInt8);
    assert_eq!(input.side(), 32);
    assert_eq!(input.byte_len(), 32 * 32 * 3);
  }

  #[test]
  fn float_input_is_normalized() {
    let frame = Frame::from(RgbImage::from_pixel(8, 8, Rgb([255, 0, 255])));
    let input = frame.to_model_input(8, TensorType::Float32);
    assert_eq!(input.byte_len(), 8 * 8 * 3 * 4);
    let first: [u8; 4] = input.as_bytes()[0..4].try_into().unwrap();
    let second: [u8; 4] = input.as_bytes()[4..8].try_into().unwrap();
    assert!((f32::from_ne_bytes(first) - 1.0).abs() < 1e-6);
    assert!((f32::from_ne_bytes(second) + 1.0).abs() < 1e-6);
  }

  #[test]
  fn crop_keeps_center_of_frame() {
    // 640x480 的左右 1/4 为红色，居中裁剪 480 后仍会保留部分红色边带
    let frame = striped(640, 480);
    let input = frame.to_model_input(480, TensorType::UInt8);
    let bytes = input.as_bytes();
    // 中心像素为蓝色
    let center = ((240 * 480 + 240) * 3) as usize;
    assert_eq!(&bytes[center..center + 3], &[0, 0, 255]);
  }
}
