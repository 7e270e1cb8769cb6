// 该文件是 Beifeng （北风） 项目的一部分。
// src/model.rs - 检测模型
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

use std::fmt;

use image::RgbImage;
use thiserror::Error;

use crate::keys::KeyValue;

mod http_detector;
pub use self::http_detector::HttpDetector;

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("HTTP 请求错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("推理服务返回状态 {0}")]
  Status(u16),
  #[error("无法解析推理结果: {0}")]
  InvalidResponse(String),
  #[error("帧编码错误: {0}")]
  FrameError(#[from] crate::frame::FrameError),
  #[error("检测失败: {0}")]
  Failed(String),
}

/// 目标检测模型，输入一帧，输出检测框
pub trait Detector {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
    (**self).detect(image)
  }
}

/// 类别标识，数字编号或标签名
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassId {
  Id(i64),
  Name(String),
}

impl fmt::Display for ClassId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ClassId::Id(id) => write!(f, "{}", id),
      ClassId::Name(name) => f.write_str(name),
    }
  }
}

impl From<ClassId> for KeyValue {
  fn from(value: ClassId) -> Self {
    match value {
      ClassId::Id(id) => KeyValue::NpInt64(id),
      ClassId::Name(name) => KeyValue::Str(name),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub kind: ClassId,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

/// 检测结果；为空表示“无检测”，该帧应被丢弃
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}
