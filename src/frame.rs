// 该文件是 Beifeng （北风） 项目的一部分。
// src/frame.rs - 帧定义与 JPEG 编解码
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

use image::{ImageBuffer, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use jpeg_decoder::PixelFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("负载为空")]
  EmptyPayload,
  #[error("图像编解码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("JPEG 解码错误: {0}")]
  JpegError(#[from] jpeg_decoder::Error),
  #[error("JPEG 缺少头信息")]
  MissingHeader,
  #[error("不支持的像素格式: {0:?}")]
  UnsupportedPixelFormat(PixelFormat),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// 采集得到的一帧：原始 RGB 像素与其 JPEG 压缩数据
#[derive(Debug, Clone)]
pub struct CapturedFrame {
  image: RgbImage,
  compressed: Vec<u8>,
}

impl CapturedFrame {
  /// 压缩后构造
  pub fn compress(image: RgbImage, quality: u8) -> Result<Self, FrameError> {
    let compressed = encode_jpeg(&image, quality)?;
    Ok(Self { image, compressed })
  }

  pub fn as_compressed_frame(&self) -> &[u8] {
    &self.compressed
  }

  pub fn into_compressed_frame(self) -> Vec<u8> {
    self.compressed
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }
}

/// 以给定质量压缩为 JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
  Ok(buffer)
}

/// 解码任意受支持格式的图像负载为 RGB
pub fn decode_image(data: &[u8]) -> Result<RgbImage, FrameError> {
  if data.is_empty() {
    return Err(FrameError::EmptyPayload);
  }
  Ok(image::load_from_memory(data)?.to_rgb8())
}

/// JPEG 解码时的降采样因子
///
/// 只有 1/4 与 1/2 两档，选择不小于输出目标的最廉价解码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeScale {
  Quarter,
  Half,
  Full,
}

impl DecodeScale {
  /// 根据输出尺寸与原始尺寸（宽, 高）的比例选择降采样因子
  pub fn select(target: (u32, u32), source: (u32, u32)) -> Self {
    let ratio_width = target.0 as f64 / source.0.max(1) as f64;
    let ratio_height = target.1 as f64 / source.1.max(1) as f64;
    // 不缩小到比输出目标更小
    let ratio = ratio_width.max(ratio_height);
    if ratio <= 0.25 {
      DecodeScale::Quarter
    } else if ratio <= 0.5 {
      DecodeScale::Half
    } else {
      DecodeScale::Full
    }
  }

  pub fn denominator(self) -> u16 {
    match self {
      DecodeScale::Quarter => 4,
      DecodeScale::Half => 2,
      DecodeScale::Full => 1,
    }
  }
}

/// 以指定降采样因子解码 JPEG
pub fn decode_jpeg_scaled(data: &[u8], scale: DecodeScale) -> Result<RgbImage, FrameError> {
  if data.is_empty() {
    return Err(FrameError::EmptyPayload);
  }

  let mut decoder = jpeg_decoder::Decoder::new(data);
  decoder.read_info()?;
  let info = decoder.info().ok_or(FrameError::MissingHeader)?;

  let (width, height) = match scale {
    DecodeScale::Full => (info.width, info.height),
    _ => {
      let denominator = scale.denominator();
      decoder.scale(
        info.width.div_ceil(denominator),
        info.height.div_ceil(denominator),
      )?
    }
  };

  let pixels = decoder.decode()?;
  let (width, height) = (width as u32, height as u32);
  let plane = width as usize * height as usize;

  match info.pixel_format {
    PixelFormat::RGB24 => {
      let expected = plane * 3;
      if pixels.len() != expected {
        return Err(FrameError::BufferSizeMismatch {
          expected,
          actual: pixels.len(),
        });
      }
      RgbImage::from_raw(width, height, pixels).ok_or(FrameError::BufferSizeMismatch {
        expected,
        actual: 0,
      })
    }
    PixelFormat::L8 => {
      if pixels.len() != plane {
        return Err(FrameError::BufferSizeMismatch {
          expected: plane,
          actual: pixels.len(),
        });
      }
      Ok(ImageBuffer::from_fn(width, height, |x, y| {
        let v = pixels[y as usize * width as usize + x as usize];
        Rgb([v, v, v])
      }))
    }
    other => Err(FrameError::UnsupportedPixelFormat(other)),
  }
}
