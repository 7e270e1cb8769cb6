// 该文件是 Beifeng （北风） 项目的一部分。
// src/vertex.rs - 流水线顶点
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

//! 流水线中的四类顶点：源、缩放、推理、汇。
//!
//! 顶点之间的每条消息由一段不透明的负载（JPEG 帧）和一组
//! `key=(type)value` 形式的键组成，键的编解码见 [`crate::keys`]。
//! map 顶点对每条输入要么转发恰好一条消息，要么丢弃。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
  frame::FrameError,
  keys::{KeyError, KeyValue, VertexKeys},
  model::{ClassId, DetectError, DetectResult},
  output::draw::BoundingBox,
};

mod filter_resize;
mod inference;
mod sink;
mod source;

pub use self::filter_resize::{FilterResize, ResizeConfig};
pub use self::inference::Inference;
pub use self::sink::{FrameCapture, Sink, SinkConfig, SinkError};
pub use self::source::{
  FrameFeed, Offset, ReadStatus, Source, SourceConfig, SourceError, SourceMessage, TXN_ID_HEADER,
};

pub const FRAME_IDX: &str = "frame_idx";
pub const ORG_HEIGHT: &str = "org_height";
pub const ORG_WIDTH: &str = "org_width";
pub const BOX_LEN: &str = "box_len";

/// 每个检测框的字段，键名为 `box_{i}_{attr}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxAttr {
  Confidence,
  ClassId,
  LeftUpX,
  LeftUpY,
  RightDownX,
  RightDownY,
}

impl BoxAttr {
  pub fn name(self) -> &'static str {
    match self {
      BoxAttr::Confidence => "confidence",
      BoxAttr::ClassId => "class_id",
      BoxAttr::LeftUpX => "LeftUpX",
      BoxAttr::LeftUpY => "LeftUpY",
      BoxAttr::RightDownX => "RightDownX",
      BoxAttr::RightDownY => "RightDownY",
    }
  }
}

pub fn box_key(index: usize, attr: BoxAttr) -> String {
  format!("box_{}_{}", index, attr.name())
}

/// 已记录的检测框数量，`box_len` 缺失时报错
pub fn box_count(keys: &VertexKeys) -> Result<usize, KeyError> {
  let len = keys.get_i64(BOX_LEN)?;
  usize::try_from(len).map_err(|_| KeyError::OutOfRange {
    key: BOX_LEN.to_string(),
    value: len,
    expected: "不能为负数",
  })
}

/// 将检测结果追加到已有检测框之后，返回新的 `box_len`
pub fn append_boxes(keys: &mut VertexKeys, result: &DetectResult) -> Result<usize, KeyError> {
  // 首个追加检测框的顶点还没有 box_len
  let base = if keys.contains(BOX_LEN) {
    box_count(keys)?
  } else {
    0
  };
  for (offset, item) in result.iter().enumerate() {
    let i = base + offset;
    let [x1, y1, x2, y2] = item.bbox;
    keys
      .set(box_key(i, BoxAttr::Confidence), item.score)?
      .set(box_key(i, BoxAttr::ClassId), item.kind.clone())?
      .set(box_key(i, BoxAttr::LeftUpX), x1)?
      .set(box_key(i, BoxAttr::LeftUpY), y1)?
      .set(box_key(i, BoxAttr::RightDownX), x2)?
      .set(box_key(i, BoxAttr::RightDownY), y2)?;
  }
  let total = base + result.len();
  keys.set(BOX_LEN, KeyValue::Int(total as i64))?;
  Ok(total)
}

/// 按 `box_len` 读出所有检测框；`box_len` 缺失时报错
pub fn read_boxes(keys: &VertexKeys) -> Result<Vec<BoundingBox>, KeyError> {
  (0..box_count(keys)?)
    .map(|i| {
      let class_id = match keys.get(&box_key(i, BoxAttr::ClassId))? {
        KeyValue::Str(name) => ClassId::Name(name.clone()),
        other => ClassId::Id(other.as_i64().ok_or_else(|| KeyError::TypeMismatch {
          key: box_key(i, BoxAttr::ClassId),
          expected: "integer or str",
          found: other.key_type(),
        })?),
      };
      Ok(BoundingBox {
        confidence: keys.get_f64(&box_key(i, BoxAttr::Confidence))?,
        class_id,
        left_up_x: keys.get_f64(&box_key(i, BoxAttr::LeftUpX))?,
        left_up_y: keys.get_f64(&box_key(i, BoxAttr::LeftUpY))?,
        right_down_x: keys.get_f64(&box_key(i, BoxAttr::RightDownX))?,
        right_down_y: keys.get_f64(&box_key(i, BoxAttr::RightDownY))?,
      })
    })
    .collect()
}

/// map/sink 顶点收到的一条输入
#[derive(Debug, Clone)]
pub struct Datum {
  pub value: Vec<u8>,
  pub keys: Vec<String>,
  pub event_time: DateTime<Utc>,
  pub headers: HashMap<String, String>,
}

impl Datum {
  pub fn new(value: Vec<u8>, keys: Vec<String>) -> Self {
    Self {
      value,
      keys,
      event_time: Utc::now(),
      headers: HashMap::new(),
    }
  }

  /// 以上游转发的消息构造下游输入，沿用本条输入的事件时间与头部
  pub fn follow(&self, message: Message) -> Self {
    Self {
      value: message.value,
      keys: message.keys,
      event_time: self.event_time,
      headers: self.headers.clone(),
    }
  }

  pub fn vertex_keys(&self) -> Result<VertexKeys, KeyError> {
    VertexKeys::from_keys(&self.keys)
  }
}

impl From<SourceMessage> for Datum {
  fn from(message: SourceMessage) -> Self {
    Self {
      value: message.payload,
      keys: message.keys,
      event_time: message.event_time,
      headers: message.headers,
    }
  }
}

/// map 顶点转发的消息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
  pub value: Vec<u8>,
  pub keys: Vec<String>,
}

/// map 顶点的输出：转发一条或丢弃
#[derive(Debug, Clone, PartialEq)]
pub enum MapOutput {
  Forward(Message),
  Drop,
}

#[derive(Error, Debug)]
pub enum StageError {
  #[error("元数据错误: {0}")]
  KeyError(#[from] KeyError),
  #[error("帧编解码错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("检测错误: {0}")]
  DetectError(#[from] DetectError),
}

pub trait MapStage {
  fn process(&self, datum: &Datum) -> Result<MapOutput, StageError>;
}
