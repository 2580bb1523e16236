// 该文件是 DtexCamera 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 把一张图片当作相机预览帧重复输出
///
/// `image:///path/to/file.jpg?repeat=30`，缺省输出一次。
pub struct ImageFileInput {
  image: RgbImage,
  repeat: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let repeat = url
      .query_pairs()
      .find(|(k, _)| k == "repeat")
      .and_then(|(_, v)| v.parse().ok())
      .unwrap_or(1);

    let image = ImageReader::open(url.path())?.decode()?.to_rgb8();
    Ok(ImageFileInput { image, repeat })
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage, repeat: usize) -> Self {
    Self { image, repeat }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn repeat(&self) -> usize {
    self.repeat
  }

  pub fn into_frames(self) -> ImageFileFrames {
    ImageFileFrames {
      image: self.image,
      remaining: self.repeat,
    }
  }
}

pub struct ImageFileFrames {
  image: RgbImage,
  remaining: usize,
}

impl Iterator for ImageFileFrames {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    Some(Frame::from(self.image.clone()))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.remaining, Some(self.remaining))
  }
}
