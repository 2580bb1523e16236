// 该文件是 DtexCamera 项目的一部分。
// src/output/capture_record.rs - 拍摄结果记录
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

use std::{
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, capture::CaptureResult};

#[derive(Error, Debug)]
pub enum CaptureRecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 与图像文件同名的 JSON 记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
  pub image: String,
  pub acceptable: bool,
  pub triggered_at: DateTime<Utc>,
  pub bytes: usize,
}

/// 按日期目录保存确认后的照片：`<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.<ext>`
pub struct CaptureRecordOutput {
  directory: PathBuf,
  counter: Mutex<u16>,
}

impl FromUrlWithScheme for CaptureRecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for CaptureRecordOutput {
  type Error = CaptureRecordError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(CaptureRecordError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }
    Ok(Self::new(uri.path()))
  }
}

impl CaptureRecordOutput {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      counter: Mutex::new(0),
    }
  }

  fn next_id(&self) -> u16 {
    let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn image_path(&self, at: &DateTime<Utc>, extension: &str) -> Result<PathBuf, CaptureRecordError> {
    let directory = self
      .directory
      .join(at.year().to_string())
      .join(format!("{:02}", at.month()))
      .join(format!("{:02}", at.day()));
    std::fs::create_dir_all(&directory)?;
    Ok(directory.join(format!(
      "{}-{:04X}.{}",
      at.format("%H-%M-%S"),
      self.next_id(),
      extension
    )))
  }

  /// 写入图像与记录，返回图像路径
  pub fn record(&self, result: &CaptureResult) -> Result<PathBuf, CaptureRecordError> {
    let bytes = result.image().as_bytes();
    let extension = image::guess_format(bytes)
      .ok()
      .and_then(|f| f.extensions_str().first().copied())
      .unwrap_or("bin");

    let path = self.image_path(&result.triggered_at(), extension)?;
    std::fs::write(&path, bytes)?;

    let record = CaptureRecord {
      image: path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default(),
      acceptable: result.acceptable(),
      triggered_at: result.triggered_at(),
      bytes: bytes.len(),
    };
    std::fs::write(
      path.with_extension("json"),
      serde_json::to_vec_pretty(&record)?,
    )?;

    info!(
      "保存拍摄结果: {} (可接受: {})",
      path.display(),
      record.acceptable
    );
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::capture::{CaptureOrchestrator, StillImage};
  use image::RgbImage;
  use std::io::Cursor;

  fn png_result(verdict: bool) -> CaptureResult {
    let mut data = Cursor::new(Vec::new());
    RgbImage::new(4, 4)
      .write_to(&mut data, image::ImageFormat::Png)
      .unwrap();
    let mut orchestrator = CaptureOrchestrator::default();
    let ticket = orchestrator.trigger(verdict).unwrap();
    orchestrator
      .deliver(ticket, Ok(StillImage::from(data.into_inner())))
      .unwrap();
    orchestrator.accept().unwrap()
  }

  #[test]
  fn writes_image_and_sidecar() {
    let dir = std::env::temp_dir().join(format!("dtex-record-{}", std::process::id()));
    let output = CaptureRecordOutput::new(&dir);
    let result = png_result(true);

    let path = output.record(&result).unwrap();
    assert_eq!(path.extension().unwrap(), "png");
    assert!(path.starts_with(&dir));

    let sidecar: CaptureRecord =
      serde_json::from_slice(&std::fs::read(path.with_extension("json")).unwrap()).unwrap();
    assert!(sidecar.acceptable);
    assert_eq!(sidecar.triggered_at, result.triggered_at());
    assert_eq!(std::fs::read(&path).unwrap(), result.image().as_bytes());
    let _ = std::fs::remove_dir_all(dir);
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("image:///tmp/out").unwrap();
    assert!(matches!(
      CaptureRecordOutput::from_url(&url),
      Err(CaptureRecordError::SchemeMismatch(_))
    ));
  }
}
