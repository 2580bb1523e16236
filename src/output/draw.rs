// 该文件是 DtexCamera 项目的一部分。
// src/output/draw.rs - 检测框叠加层绘制
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::model::{DetectionBox, RankedGroups};

const BOX_THICKNESS: u32 = 2;

/// 模型参考系（居中正方形）到视口像素的映射
///
/// 每次绘制都按当前视口尺寸重新计算，视口可能在帧间旋转或缩放。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
  x_offset: f32,
  y_offset: f32,
  side: f32,
}

impl ViewportTransform {
  pub fn for_viewport(width: u32, height: u32) -> Self {
    let side = width.min(height);
    Self {
      x_offset: ((width - side) / 2) as f32,
      y_offset: ((height - side) / 2) as f32,
      side: side as f32,
    }
  }

  /// 返回 (x, y, width, height)，坐标顺序已从 (ymin, xmin, ymax, xmax) 转换
  pub fn to_pixels(&self, b: &DetectionBox) -> (i32, i32, u32, u32) {
    let x_min = (self.x_offset + b.xmin.clamp(0.0, 1.0) * self.side).floor();
    let y_min = (self.y_offset + b.ymin.clamp(0.0, 1.0) * self.side).floor();
    let x_max = (self.x_offset + b.xmax.clamp(0.0, 1.0) * self.side).ceil();
    let y_max = (self.y_offset + b.ymax.clamp(0.0, 1.0) * self.side).ceil();
    (
      x_min as i32,
      y_min as i32,
      (x_max - x_min).max(0.0) as u32,
      (y_max - y_min).max(0.0) as u32,
    )
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Draw {
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_thickness(thickness: u32) -> Self {
    Self { thickness }
  }

  fn draw_bbox(&self, image: &mut RgbImage, transform: &ViewportTransform, b: &DetectionBox, color: [u8; 3]) {
    let (x, y, w, h) = transform.to_pixels(b);
    for t in 0..self.thickness {
      let inset = 2 * t;
      if w <= inset || h <= inset {
        break;
      }
      let rect = Rect::at(x + t as i32, y + t as i32).of_size(w - inset, h - inset);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }
  }

  /// 按组颜色绘制所有保留的检测框
  pub fn draw_overlay(&self, image: &mut RgbImage, groups: &RankedGroups) {
    let transform = ViewportTransform::for_viewport(image.width(), image.height());
    for group in &groups.groups {
      for b in &group.boxes {
        self.draw_bbox(image, &transform, b, group.color);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::aggregate;

  fn detection(ymin: f32, xmin: f32, ymax: f32, xmax: f32) -> DetectionBox {
    DetectionBox {
      ymin,
      xmin,
      ymax,
      xmax,
      score: 0.9,
      category: 0.0,
    }
  }

  #[test]
  fn maps_into_centered_square_of_landscape_viewport() {
    let transform = ViewportTransform::for_viewport(640, 480);
    let (x, y, w, h) = transform.to_pixels(&detection(0.0, 0.0, 0.5, 1.0));
    assert_eq!((x, y, w, h), (80, 0, 480, 240));
  }

  #[test]
  fn mapping_follows_current_viewport() {
    let b = detection(0.25, 0.25, 0.75, 0.75);
    let portrait = ViewportTransform::for_viewport(480, 640).to_pixels(&b);
    let landscape = ViewportTransform::for_viewport(640, 480).to_pixels(&b);
    assert_eq!(portrait, (120, 200, 240, 240));
    assert_eq!(landscape, (200, 120, 240, 240));
  }

  #[test]
  fn draws_group_color_on_box_edge() {
    let mut image = RgbImage::new(100, 100);
    let ranked = aggregate(&[0.9], &[0.1, 0.2, 0.5, 0.6], &[3.0]).unwrap();
    Draw::default().draw_overlay(&mut image, &ranked);
    let color = ranked.groups[0].color;
    // 左上角 (x=20, y=10)
    assert_eq!(image.get_pixel(20, 10), &Rgb(color));
    assert_eq!(image.get_pixel(21, 11), &Rgb(color));
    assert_eq!(image.get_pixel(40, 30), &Rgb([0, 0, 0]));
  }
}
