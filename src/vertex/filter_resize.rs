// 该文件是 Beifeng （北风） 项目的一部分。
// src/vertex/filter_resize.rs - 缩放顶点
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

use image::imageops::{self, FilterType};
use tracing::{debug, info};

use super::{Datum, FRAME_IDX, MapOutput, MapStage, Message, ORG_HEIGHT, ORG_WIDTH, StageError};
use crate::{
  frame::{DecodeScale, decode_jpeg_scaled, encode_jpeg},
  keys::{KeyError, VertexKeys},
};

#[derive(Debug, Clone)]
pub struct ResizeConfig {
  pub output_width: u32,
  pub output_height: u32,
  pub jpeg_quality: u8,
}

impl Default for ResizeConfig {
  fn default() -> Self {
    Self {
      output_width: 416,
      output_height: 416,
      jpeg_quality: 90,
    }
  }
}

/// 按原始尺寸选择降采样解码，缩放到固定尺寸后重新压缩
pub struct FilterResize {
  config: ResizeConfig,
}

impl FilterResize {
  pub fn new(config: ResizeConfig) -> Self {
    info!(
      "缩放顶点初始化, 输出 {}x{}",
      config.output_width, config.output_height
    );
    Self { config }
  }
}

/// 原始尺寸必须是正的 u32
fn dimension(keys: &VertexKeys, key: &str) -> Result<u32, KeyError> {
  let value = keys.get_i64(key)?;
  u32::try_from(value)
    .ok()
    .filter(|v| *v > 0)
    .ok_or_else(|| KeyError::OutOfRange {
      key: key.to_string(),
      value,
      expected: "1 到 u32::MAX 之间",
    })
}

impl MapStage for FilterResize {
  fn process(&self, datum: &Datum) -> Result<MapOutput, StageError> {
    let keys = datum.vertex_keys()?;
    let frame_idx = keys.get_i64(FRAME_IDX)?;
    let org_height = dimension(&keys, ORG_HEIGHT)?;
    let org_width = dimension(&keys, ORG_WIDTH)?;
    info!("frame_index: {}", frame_idx);

    let target = (self.config.output_width, self.config.output_height);
    let scale = DecodeScale::select(target, (org_width, org_height));
    let frame = decode_jpeg_scaled(&datum.value, scale)?;
    debug!(
      "解码 {:?}: {}x{} -> {}x{}",
      scale,
      org_width,
      org_height,
      frame.width(),
      frame.height()
    );

    // 空结果丢弃
    if target.0 == 0 || target.1 == 0 || frame.width() == 0 || frame.height() == 0 {
      return Ok(MapOutput::Drop);
    }
    let resized = imageops::resize(&frame, target.0, target.1, FilterType::Triangle);

    Ok(MapOutput::Forward(Message {
      value: encode_jpeg(&resized, self.config.jpeg_quality)?,
      keys: keys.to_keys(),
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::decode_image;
  use image::RgbImage;

  fn datum(width: u32, height: u32) -> Datum {
    let image = RgbImage::from_fn(width, height, |x, y| {
      image::Rgb([(x % 255) as u8, (y % 255) as u8, 90])
    });
    let mut keys = VertexKeys::new();
    keys
      .set(FRAME_IDX, 5i64)
      .unwrap()
      .set(ORG_HEIGHT, height)
      .unwrap()
      .set(ORG_WIDTH, width)
      .unwrap();
    Datum::new(encode_jpeg(&image, 90).unwrap(), keys.to_keys())
  }

  #[test]
  fn resizes_to_target_and_keeps_keys() {
    let stage = FilterResize::new(ResizeConfig::default());
    let input = datum(1280, 720);
    let MapOutput::Forward(message) = stage.process(&input).unwrap() else {
      panic!("unexpected drop");
    };
    assert_eq!(message.keys, input.keys);
    assert_eq!(decode_image(&message.value).unwrap().dimensions(), (416, 416));
  }

  #[test]
  fn empty_target_is_dropped() {
    let stage = FilterResize::new(ResizeConfig {
      output_width: 0,
      output_height: 0,
      jpeg_quality: 90,
    });
    assert_eq!(stage.process(&datum(64, 48)).unwrap(), MapOutput::Drop);
  }

  #[test]
  fn missing_dimensions_are_an_error() {
    let stage = FilterResize::new(ResizeConfig::default());
    let mut input = datum(64, 48);
    input.keys.retain(|k| !k.starts_with(ORG_WIDTH));
    assert!(matches!(
      stage.process(&input),
      Err(StageError::KeyError(_))
    ));
  }

  #[test]
  fn out_of_range_dimensions_are_an_error() {
    let stage = FilterResize::new(ResizeConfig::default());
    for bad in [0i64, -48, i64::from(u32::MAX) + 1] {
      let mut input = datum(64, 48);
      let mut keys = input.vertex_keys().unwrap();
      keys.set(ORG_HEIGHT, bad).unwrap();
      input.keys = keys.to_keys();
      assert!(matches!(
        stage.process(&input),
        Err(StageError::KeyError(KeyError::OutOfRange { value, .. })) if value == bad
      ));
    }
  }
}
