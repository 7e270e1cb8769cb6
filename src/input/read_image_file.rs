// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/read_image_file.rs - 静态图像文件采集
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

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::info;

use super::{CaptureError, VideoCapture};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 将单张图像当作只有一帧的有限源
pub struct ImageFileCapture {
  image: Option<RgbImage>,
}

impl ImageFileCapture {
  pub fn open(path: &Path) -> Result<Self, ImageFileInputError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    info!(
      "加载图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );
    Ok(Self {
      image: Some(image.into_rgb8()),
    })
  }
}

impl VideoCapture for ImageFileCapture {
  fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
    Ok(self.image.take())
  }

  fn frame_count(&self) -> Option<u64> {
    Some(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn yields_image_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let mut capture = ImageFileCapture::open(&path).unwrap();
    let frame = capture.read_frame().unwrap().unwrap();
    assert_eq!(frame.dimensions(), (8, 6));
    assert_eq!(frame.get_pixel(3, 3), &Rgb([10, 20, 30]));
    assert!(capture.read_frame().unwrap().is_none());
  }

  #[test]
  fn missing_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFileCapture::open(&dir.path().join("absent.png")),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
