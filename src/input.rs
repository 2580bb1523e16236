// 该文件是 DtexCamera 项目的一部分。
// src/input.rs - 帧、运动样本与静态拍摄来源
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
  sync::mpsc::{self, Receiver},
  thread,
  time::Duration,
};

use tracing::debug;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod motion_replay;
pub use self::motion_replay::{MotionReplay, MotionReplayError};

mod still_image;
pub use self::still_image::ImageStillCapture;

/// 以固定间隔把条目依次送入通道
///
/// 条目耗尽或接收端被丢弃时，生产线程结束。
pub fn stream_at_interval<T, I>(items: I, interval: Duration) -> Receiver<T>
where
  T: Send + 'static,
  I: IntoIterator<Item = T>,
  I::IntoIter: Send + 'static,
{
  let (tx, rx) = mpsc::channel();
  let items = items.into_iter();
  thread::spawn(move || {
    for (index, item) in items.enumerate() {
      if tx.send(item).is_err() {
        debug!("接收端已关闭，停止发送 (已发送 {})", index);
        return;
      }
      thread::sleep(interval);
    }
  });
  rx
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn streams_all_items_in_order() {
    let rx = stream_at_interval(vec![1, 2, 3], Duration::from_millis(1));
    let got: Vec<i32> = rx.iter().collect();
    assert_eq!(got, vec![1, 2, 3]);
  }

  #[test]
  fn producer_stops_when_receiver_dropped() {
    let rx = stream_at_interval(0.., Duration::from_millis(1));
    assert_eq!(rx.recv().unwrap(), 0);
    drop(rx);
  }
}
