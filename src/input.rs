// 该文件是 Beifeng （北风） 项目的一部分。
// src/input.rs - 视频/图像采集输入
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

use std::{fmt, path::PathBuf, time::Duration};

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::FrameError};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileCapture, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerCapture, GStreamerInputError};

mod reader;
pub use self::reader::{FrameReader, ReaderConfig, SlotItem};

/// 被识别为持续直播流的 URL scheme
pub const STREAM_SCHEMES: &[&str] = &["rtsp", "rtsps", "http", "https", "udp", "srt"];
const FILE_SCHEME: &str = "file";
const IMAGE_SCHEME: &str = "image";

#[derive(Error, Debug)]
pub enum InputError {
  #[error("不支持的 URI scheme: {0}")]
  SchemeMismatch(String),
  #[error("URI 中的路径无效: {0}")]
  InvalidPath(String),
}

#[derive(Error, Debug)]
pub enum CaptureError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("无法打开采集源 {location}: {reason}")]
  Open { location: String, reason: String },
  #[error("读取帧失败: {0}")]
  Read(String),
  #[error("当前构建不支持该采集源: {0}")]
  Unsupported(String),
  #[error("帧压缩失败: {0}")]
  Compress(#[from] FrameError),
  #[error("连续读取失败 {count} 次")]
  ReadFailures { count: u32 },
  #[error("重连次数 {attempts} 超过上限 {limit}")]
  ReconnectExhausted { attempts: u32, limit: u32 },
  #[error("采集线程异常退出")]
  WorkerPanicked,
}

/// 采集源位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
  /// 有限长度的视频文件，读完即结束
  File(PathBuf),
  /// 持续的直播流，读失败时重连
  Stream(Url),
  /// 单张静态图像
  Image(PathBuf),
}

impl CaptureSource {
  pub fn is_live(&self) -> bool {
    matches!(self, CaptureSource::Stream(_))
  }

  pub fn location(&self) -> String {
    match self {
      CaptureSource::File(path) | CaptureSource::Image(path) => path.display().to_string(),
      CaptureSource::Stream(url) => url.to_string(),
    }
  }
}

impl fmt::Display for CaptureSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CaptureSource::File(path) => write!(f, "file:{}", path.display()),
      CaptureSource::Stream(url) => write!(f, "stream:{}", url),
      CaptureSource::Image(path) => write!(f, "image:{}", path.display()),
    }
  }
}

impl FromUrl for CaptureSource {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let scheme = url.scheme();
    if STREAM_SCHEMES.contains(&scheme) {
      return Ok(CaptureSource::Stream(url.clone()));
    }

    let path = || -> Result<PathBuf, InputError> {
      let path = url.path();
      if path.is_empty() || path == "/" {
        return Err(InputError::InvalidPath(url.to_string()));
      }
      Ok(PathBuf::from(path))
    };

    match scheme {
      FILE_SCHEME => Ok(CaptureSource::File(
        url
          .to_file_path()
          .map_err(|_| InputError::InvalidPath(url.to_string()))?,
      )),
      IMAGE_SCHEME => Ok(CaptureSource::Image(path()?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

/// 已打开的采集句柄
pub trait VideoCapture: Send {
  /// 读取下一帧；`Ok(None)` 表示有限源已读完
  fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError>;

  /// 总帧数（如果可知）
  fn frame_count(&self) -> Option<u64> {
    None
  }

  /// 总时长（如果可知）
  fn duration(&self) -> Option<Duration> {
    None
  }
}

/// 根据采集源打开采集句柄
pub trait CaptureBackend: Send {
  fn open(&self, source: &CaptureSource) -> Result<Box<dyn VideoCapture>, CaptureError>;
}

/// 按启用的特性分派到 GStreamer 或静态图像
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

impl CaptureBackend for DefaultBackend {
  fn open(&self, source: &CaptureSource) -> Result<Box<dyn VideoCapture>, CaptureError> {
    match source {
      #[cfg(feature = "read_image_file")]
      CaptureSource::Image(path) => Ok(Box::new(ImageFileCapture::open(path)?)),
      #[cfg(feature = "gstreamer_input")]
      CaptureSource::File(_) | CaptureSource::Stream(_) => {
        Ok(Box::new(GStreamerCapture::open(source)?))
      }
      #[allow(unreachable_patterns)]
      other => Err(CaptureError::Unsupported(other.to_string())),
    }
  }
}
