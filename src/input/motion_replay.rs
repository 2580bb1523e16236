// 该文件是 DtexCamera 项目的一部分。
// src/input/motion_replay.rs - 运动样本回放
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

use std::{path::Path, sync::mpsc::Receiver, time::Duration};

use thiserror::Error;
use tracing::info;

use crate::{input::stream_at_interval, motion::MotionSample};

#[derive(Error, Debug)]
pub enum MotionReplayError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行格式错误: {source}")]
  Format {
    line: usize,
    source: serde_json::Error,
  },
  #[error("没有运动样本")]
  Empty,
}

/// 每行一个 JSON 格式的 [`MotionSample`]，空行与 `#` 开头的行被忽略
pub struct MotionReplay {
  samples: Vec<MotionSample>,
}

impl MotionReplay {
  pub fn from_samples(samples: Vec<MotionSample>) -> Result<Self, MotionReplayError> {
    if samples.is_empty() {
      return Err(MotionReplayError::Empty);
    }
    Ok(Self { samples })
  }

  pub fn parse(text: &str) -> Result<Self, MotionReplayError> {
    let samples = text
      .lines()
      .enumerate()
      .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
      .map(|(i, l)| {
        serde_json::from_str(l).map_err(|source| MotionReplayError::Format { line: i + 1, source })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Self::from_samples(samples)
  }

  pub fn from_path(path: &Path) -> Result<Self, MotionReplayError> {
    let text = std::fs::read_to_string(path)?;
    let replay = Self::parse(&text)?;
    info!(
      "读取 {} 个运动样本: {}",
      replay.samples.len(),
      path.display()
    );
    Ok(replay)
  }

  pub fn samples(&self) -> &[MotionSample] {
    &self.samples
  }

  /// 以固定间隔发送样本；`looping` 为真时循环发送直到接收端关闭
  pub fn into_stream(self, interval: Duration, looping: bool) -> Receiver<MotionSample> {
    let samples: Box<dyn Iterator<Item = MotionSample> + Send> = if looping {
      Box::new(self.samples.into_iter().cycle())
    } else {
      Box::new(self.samples.into_iter())
    };
    stream_at_interval(samples, interval)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TEXT: &str = r#"
# 静止，俯仰 0.6 弧度
{"pitch":0.6,"user_acceleration":{"x":0,"y":0,"z":0},"gravity":{"x":0,"y":-1,"z":0}}

{"pitch":0.7,"user_acceleration":{"x":0,"y":0.1,"z":0},"gravity":{"x":0,"y":-1,"z":0}}
"#;

  #[test]
  fn parses_lines_skipping_comments() {
    let replay = MotionReplay::parse(TEXT).unwrap();
    assert_eq!(replay.samples().len(), 2);
    assert_eq!(replay.samples()[1].pitch, 0.7);
  }

  #[test]
  fn reports_bad_line_number() {
    let text = format!("{}\nnot json", TEXT.lines().nth(2).unwrap());
    let err = MotionReplay::parse(&text).err().unwrap();
    assert!(matches!(err, MotionReplayError::Format { line: 2, .. }));
  }

  #[test]
  fn empty_file_is_rejected() {
    assert!(matches!(
      MotionReplay::parse("# nothing\n"),
      Err(MotionReplayError::Empty)
    ));
  }

  #[test]
  fn looping_stream_repeats() {
    let rx = MotionReplay::parse(TEXT)
      .unwrap()
      .into_stream(Duration::from_millis(1), true);
    let pitches: Vec<f64> = rx.iter().take(5).map(|s| s.pitch).collect();
    assert_eq!(pitches, vec![0.6, 0.7, 0.6, 0.7, 0.6]);
  }
}
