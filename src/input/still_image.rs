// 该文件是 DtexCamera 项目的一部分。
// src/input/still_image.rs - 基于图像的静态拍摄
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

use std::{io::Cursor, sync::Arc, thread, time::Duration};

use image::RgbImage;
use tracing::debug;

use crate::capture::{CaptureError, StillCallback, StillCapture, StillCaptureSettings, StillImage};

/// 每次拍摄都把同一张图像按请求的编码格式输出
///
/// 编码在后台线程中完成，模拟采集端的异步返回。
pub struct ImageStillCapture {
  image: Arc<RgbImage>,
  latency: Duration,
}

impl ImageStillCapture {
  pub fn new(image: RgbImage) -> Self {
    Self {
      image: Arc::new(image),
      latency: Duration::ZERO,
    }
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }
}

fn encode(image: &RgbImage, settings: &StillCaptureSettings) -> Result<StillImage, CaptureError> {
  let mut data = Cursor::new(Vec::new());
  image
    .write_to(&mut data, settings.codec.image_format())
    .map_err(|e| CaptureError::Device(e.to_string()))?;
  Ok(StillImage::from(data.into_inner()))
}

impl StillCapture for ImageStillCapture {
  fn request_still(&mut self, settings: &StillCaptureSettings, done: StillCallback) {
    let image = Arc::clone(&self.image);
    let settings = *settings;
    let latency = self.latency;
    thread::spawn(move || {
      thread::sleep(latency);
      debug!("编码静态图像: {:?}", settings.codec);
      done(encode(&image, &settings));
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc;

  #[test]
  fn delivers_decodable_jpeg() {
    let mut still = ImageStillCapture::new(RgbImage::new(16, 8));
    let (tx, rx) = mpsc::channel();
    still.request_still(
      &StillCaptureSettings::default(),
      Box::new(move |r| {
        let _ = tx.send(r);
      }),
    );
    let image = rx.recv().unwrap().unwrap();
    assert_eq!(&image.as_bytes()[..2], &[0xFF, 0xD8]);
    assert_eq!(image.decode().unwrap().dimensions(), (16, 8));
  }
}
