// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/draw.rs - 检测框叠加绘制
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
use tracing::debug;

use crate::model::ClassId;

// 归一化输出可能略微越出 [0, 1]
const NORMALIZED_EPSILON: f64 = 1e-3;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

/// 一个检测框，坐标可能是归一化值也可能是像素值
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
  pub confidence: f64,
  pub class_id: ClassId,
  pub left_up_x: f64,
  pub left_up_y: f64,
  pub right_down_x: f64,
  pub right_down_y: f64,
}

/// 裁剪到图像范围内的像素矩形，两端都包含
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
  pub left: u32,
  pub top: u32,
  pub right: u32,
  pub bottom: u32,
}

impl PixelRect {
  pub fn width(&self) -> u32 {
    self.right - self.left + 1
  }

  pub fn height(&self) -> u32 {
    self.bottom - self.top + 1
  }
}

impl BoundingBox {
  fn coords(&self) -> [f64; 4] {
    [
      self.left_up_x,
      self.left_up_y,
      self.right_down_x,
      self.right_down_y,
    ]
  }

  /// 四个坐标都落在 [-ε, 1+ε] 内时视为归一化坐标
  ///
  /// 这是一个近似判断：靠近原点、小于 1 像素的像素坐标框会被误判为归一化。
  pub fn is_normalized(&self) -> bool {
    self
      .coords()
      .iter()
      .all(|v| (-NORMALIZED_EPSILON..=1.0 + NORMALIZED_EPSILON).contains(v))
  }

  /// 换算为像素矩形并裁剪到图像内；退化的框返回 `None`
  pub fn to_pixel_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
    if width == 0 || height == 0 {
      return None;
    }
    let [lu_x, lu_y, rd_x, rd_y] = self.coords();
    let (lu_x, lu_y, rd_x, rd_y) = if self.is_normalized() {
      let (w, h) = (width as f64, height as f64);
      (
        lu_x.clamp(0.0, 1.0) * w,
        lu_y.clamp(0.0, 1.0) * h,
        rd_x.clamp(0.0, 1.0) * w,
        rd_y.clamp(0.0, 1.0) * h,
      )
    } else {
      (lu_x, lu_y, rd_x, rd_y)
    };

    let clip = |v: f64, limit: u32| -> u32 {
      if v.is_nan() {
        return 0;
      }
      v.round_ties_even().clamp(0.0, (limit - 1) as f64) as u32
    };
    let rect = PixelRect {
      left: clip(lu_x, width),
      top: clip(lu_y, height),
      right: clip(rd_x, width),
      bottom: clip(rd_y, height),
    };
    (rect.right > rect.left && rect.bottom > rect.top).then_some(rect)
  }
}

/// 线宽 `max(1, min(h, w) / 200)`
pub fn line_thickness(width: u32, height: u32) -> u32 {
  (width.min(height) / 200).max(1)
}

/// 检测框绘制器
#[derive(Debug, Clone)]
pub struct Draw {
  color: Rgb<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: Rgb(BOX_COLOR),
    }
  }
}

impl Draw {
  /// 在 `image` 上绘制所有有效的框，返回实际绘制的数量
  pub fn draw_boxes(&self, image: &mut RgbImage, boxes: &[BoundingBox], frame_idx: i64) -> usize {
    let (width, height) = image.dimensions();
    let thickness = line_thickness(width, height);
    let mut drawn = 0;

    for bbox in boxes {
      let Some(rect) = bbox.to_pixel_rect(width, height) else {
        debug!(
          "跳过无效检测框 (frame_index={}): {:?} is_normalized={}",
          frame_idx,
          bbox.coords(),
          bbox.is_normalized()
        );
        continue;
      };
      self.draw_rect(image, rect, thickness);
      drawn += 1;
    }
    drawn
  }

  // 线宽向框内加粗
  fn draw_rect(&self, image: &mut RgbImage, rect: PixelRect, thickness: u32) {
    for t in 0..thickness {
      let (w, h) = (rect.width(), rect.height());
      if w <= 2 * t || h <= 2 * t {
        break;
      }
      let ring =
        Rect::at((rect.left + t) as i32, (rect.top + t) as i32).of_size(w - 2 * t, h - 2 * t);
      draw_hollow_rect_mut(image, ring, self.color);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bbox(coords: [f64; 4]) -> BoundingBox {
    BoundingBox {
      confidence: 0.9,
      class_id: ClassId::Id(0),
      left_up_x: coords[0],
      left_up_y: coords[1],
      right_down_x: coords[2],
      right_down_y: coords[3],
    }
  }

  #[test]
  fn detects_normalized_coordinates_with_tolerance() {
    assert!(bbox([0.1, 0.2, 0.8, 0.9]).is_normalized());
    assert!(bbox([-0.0005, 0.0, 1.0005, 1.0]).is_normalized());
    assert!(!bbox([-0.01, 0.0, 0.5, 0.5]).is_normalized());
    assert!(!bbox([10.0, 20.0, 100.0, 200.0]).is_normalized());
  }

  #[test]
  fn normalized_box_scales_to_pixels() {
    let rect = bbox([0.25, 0.5, 0.75, 1.0]).to_pixel_rect(400, 200).unwrap();
    assert_eq!(
      rect,
      PixelRect {
        left: 100,
        top: 100,
        right: 300,
        bottom: 199,
      }
    );
  }

  #[test]
  fn pixel_box_is_clipped_to_image() {
    let rect = bbox([-20.0, 5.4, 500.0, 80.6]).to_pixel_rect(416, 416).unwrap();
    assert_eq!(
      rect,
      PixelRect {
        left: 0,
        top: 5,
        right: 415,
        bottom: 81,
      }
    );
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    assert_eq!(bbox([50.0, 50.0, 50.0, 90.0]).to_pixel_rect(100, 100), None);
    assert_eq!(bbox([60.0, 50.0, 40.0, 90.0]).to_pixel_rect(100, 100), None);
    // 完全在图像外，裁剪后宽度为零
    assert_eq!(bbox([200.0, 10.0, 300.0, 20.0]).to_pixel_rect(100, 100), None);

    let mut image = RgbImage::new(100, 100);
    let drawn = Draw::default().draw_boxes(&mut image, &[bbox([60.0, 50.0, 40.0, 90.0])], 0);
    assert_eq!(drawn, 0);
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[derive(Clone, Default)]
  struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

  impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn skipped_boxes_are_not_reported_as_warnings() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_max_level(tracing::Level::WARN)
      .with_writer(move || writer.clone())
      .finish();

    tracing::subscriber::with_default(subscriber, || {
      let mut image = RgbImage::new(100, 100);
      let boxes = [bbox([60.0, 50.0, 40.0, 90.0]), bbox([200.0, 10.0, 300.0, 20.0])];
      assert_eq!(Draw::default().draw_boxes(&mut image, &boxes, 3), 0);
    });
    assert!(captured.0.lock().unwrap().is_empty());
  }

  #[test]
  fn thickness_follows_frame_size() {
    assert_eq!(line_thickness(416, 416), 2);
    assert_eq!(line_thickness(100, 100), 1);
    assert_eq!(line_thickness(3840, 2160), 10);
  }

  #[test]
  fn drawn_pixels_stay_on_rectangle_outline() {
    let mut image = RgbImage::new(416, 416);
    let target = bbox([100.0, 120.0, 200.0, 180.0]);
    let drawn = Draw::default().draw_boxes(&mut image, &[target.clone()], 7);
    assert_eq!(drawn, 1);

    let rect = target.to_pixel_rect(416, 416).unwrap();
    let t = line_thickness(416, 416);
    let mut changed = 0;
    for (x, y, pixel) in image.enumerate_pixels() {
      if pixel.0 == [0, 0, 0] {
        continue;
      }
      changed += 1;
      assert_eq!(pixel.0, BOX_COLOR);
      let inside_outer =
        x >= rect.left && x <= rect.right && y >= rect.top && y <= rect.bottom;
      let inside_inner = x >= rect.left + t
        && x + t <= rect.right
        && y >= rect.top + t
        && y + t <= rect.bottom;
      assert!(inside_outer && !inside_inner, "({}, {})", x, y);
    }
    assert!(changed > 0);
    assert!(changed <= 2 * t * (rect.width() + rect.height()));
  }
}
