// 该文件是 Beifeng （北风） 项目的一部分。
// src/vertex/source.rs - 源顶点
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
  collections::{HashMap, HashSet},
  time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::{FRAME_IDX, ORG_HEIGHT, ORG_WIDTH};
use crate::{
  input::{FrameReader, SlotItem},
  keys::{KeyError, KeyValue, VertexKeys},
  slot::FrameSlot,
};

pub const TXN_ID_HEADER: &str = "x-txn-id";

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("元数据错误: {0}")]
  KeyError(#[from] KeyError),
  #[error("确认了未知的 offset: {0}")]
  UnknownOffset(String),
  #[error("采集已异常终止")]
  CaptureAborted,
}

#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
  pub partition: i32,
}

/// 帧的来源：采集线程或直接使用的交接槽
pub trait FrameFeed {
  /// `timeout` 为 `None` 时阻塞等待
  fn next_item(&self, timeout: Option<Duration>) -> Option<SlotItem>;
}

impl FrameFeed for FrameSlot<SlotItem> {
  fn next_item(&self, timeout: Option<Duration>) -> Option<SlotItem> {
    match timeout {
      Some(timeout) => self.take_timeout(timeout),
      None => Some(self.take()),
    }
  }
}

impl FrameFeed for FrameReader {
  fn next_item(&self, timeout: Option<Duration>) -> Option<SlotItem> {
    match timeout {
      Some(timeout) => self.next_frame_timeout(timeout),
      None => Some(self.next_frame()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Offset {
  pub offset: Vec<u8>,
  pub partition_id: i32,
}

impl Offset {
  fn text(&self) -> String {
    String::from_utf8_lossy(&self.offset).into_owned()
  }
}

/// 源顶点发出的一条消息
#[derive(Debug, Clone)]
pub struct SourceMessage {
  pub payload: Vec<u8>,
  pub offset: Offset,
  pub event_time: DateTime<Utc>,
  pub keys: Vec<String>,
  pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
  /// 仍有未确认的 offset，本次读取被拒绝
  Pending,
  /// 发出的消息数（超时时可能少于请求数）
  Emitted(usize),
  /// 帧源已结束，之后的读取都直接返回该状态
  EndOfStream,
}

/// 源顶点：从帧源取帧，打上 `frame_idx`/`org_height`/`org_width` 后发出
///
/// 同一时刻最多只有一批消息在途：存在未确认 offset 时读取直接返回。
pub struct Source<F> {
  feed: F,
  config: SourceConfig,
  to_ack: HashSet<String>,
  read_idx: u64,
  finished: bool,
}

impl<F: FrameFeed> Source<F> {
  pub fn new(feed: F, config: SourceConfig) -> Self {
    info!("源顶点初始化, partition={}", config.partition);
    Self {
      feed,
      config,
      to_ack: HashSet::new(),
      read_idx: 0,
      finished: false,
    }
  }

  pub fn into_feed(self) -> F {
    self.feed
  }

  /// 读取至多 `num_records` 条消息，通过 `emit` 逐条发出
  pub fn read<E>(
    &mut self,
    num_records: usize,
    timeout: Option<Duration>,
    mut emit: E,
  ) -> Result<ReadStatus, SourceError>
  where
    E: FnMut(SourceMessage),
  {
    if self.finished {
      return Ok(ReadStatus::EndOfStream);
    }
    if !self.to_ack.is_empty() {
      debug!("{} 个 offset 尚未确认，跳过读取", self.to_ack.len());
      return Ok(ReadStatus::Pending);
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut emitted = 0;
    while emitted < num_records {
      let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
      let Some(item) = self.feed.next_item(remaining) else {
        break;
      };
      let frame = match item {
        SlotItem::Frame(frame) => frame,
        SlotItem::EndOfStream => {
          info!("帧源已结束");
          self.finished = true;
          return Ok(if emitted == 0 {
            ReadStatus::EndOfStream
          } else {
            ReadStatus::Emitted(emitted)
          });
        }
        SlotItem::Aborted => {
          self.finished = true;
          return Err(SourceError::CaptureAborted);
        }
      };

      let mut keys = VertexKeys::new();
      keys
        .set(FRAME_IDX, KeyValue::Int(self.read_idx as i64))?
        .set(ORG_HEIGHT, frame.height())?
        .set(ORG_WIDTH, frame.width())?;

      let offset_text = self.read_idx.to_string();
      let headers = HashMap::from([(TXN_ID_HEADER.to_string(), Uuid::new_v4().to_string())]);
      emit(SourceMessage {
        payload: frame.into_compressed_frame(),
        offset: Offset {
          offset: offset_text.clone().into_bytes(),
          partition_id: self.config.partition,
        },
        event_time: Utc::now(),
        keys: keys.to_keys(),
        headers,
      });

      self.to_ack.insert(offset_text);
      self.read_idx += 1;
      emitted += 1;
    }
    Ok(ReadStatus::Emitted(emitted))
  }

  /// 确认 offset；遇到未知 offset 时报错，此前的确认仍然生效
  pub fn ack(&mut self, offsets: &[Offset]) -> Result<(), SourceError> {
    for offset in offsets {
      let text = offset.text();
      if !self.to_ack.remove(&text) {
        return Err(SourceError::UnknownOffset(text));
      }
    }
    Ok(())
  }

  /// 待处理数量未知，总是报告 0
  pub fn pending(&self) -> u64 {
    0
  }

  pub fn partitions(&self) -> Vec<i32> {
    vec![self.config.partition]
  }

  pub fn unacknowledged(&self) -> usize {
    self.to_ack.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::CapturedFrame;
  use image::RgbImage;

  fn frame(width: u32, height: u32) -> SlotItem {
    SlotItem::Frame(CapturedFrame::compress(RgbImage::new(width, height), 90).unwrap())
  }

  fn collect(
    source: &mut Source<FrameSlot<SlotItem>>,
    n: usize,
  ) -> (ReadStatus, Vec<SourceMessage>) {
    let mut messages = Vec::new();
    let status = source
      .read(n, Some(Duration::from_millis(50)), |m| messages.push(m))
      .unwrap();
    (status, messages)
  }

  #[test]
  fn stamps_frame_metadata() {
    let slot = FrameSlot::new();
    let mut source = Source::new(slot.clone(), SourceConfig::default());
    slot.put(frame(64, 48));

    let (status, messages) = collect(&mut source, 1);
    assert_eq!(status, ReadStatus::Emitted(1));
    let message = &messages[0];
    assert_eq!(
      message.keys,
      vec![
        "frame_idx=(int)0".to_string(),
        "org_height=(int)48".to_string(),
        "org_width=(int)64".to_string(),
      ]
    );
    assert_eq!(message.offset.offset, b"0");
    assert!(Uuid::parse_str(&message.headers[TXN_ID_HEADER]).is_ok());
    assert!(!message.payload.is_empty());
  }

  #[test]
  fn read_is_gated_until_ack() {
    let slot = FrameSlot::new();
    let mut source = Source::new(slot.clone(), SourceConfig::default());
    slot.put(frame(8, 8));
    let (_, first) = collect(&mut source, 1);

    slot.put(frame(8, 8));
    let (status, messages) = collect(&mut source, 1);
    assert_eq!(status, ReadStatus::Pending);
    assert!(messages.is_empty());
    // 被拒绝的读取不消费帧
    assert!(!slot.is_empty());

    source.ack(&[first[0].offset.clone()]).unwrap();
    let (status, messages) = collect(&mut source, 1);
    assert_eq!(status, ReadStatus::Emitted(1));
    assert_eq!(messages[0].keys[0], "frame_idx=(int)1");
  }

  #[test]
  fn unknown_offset_ack_fails() {
    let mut source = Source::new(FrameSlot::<SlotItem>::new(), SourceConfig::default());
    let offset = Offset {
      offset: b"9".to_vec(),
      partition_id: 0,
    };
    assert!(matches!(
      source.ack(&[offset]),
      Err(SourceError::UnknownOffset(text)) if text == "9"
    ));
  }

  #[test]
  fn end_of_stream_terminates_batch_and_sticks() {
    let slot = FrameSlot::new();
    let mut source = Source::new(slot.clone(), SourceConfig::default());
    slot.put(SlotItem::EndOfStream);

    let (status, messages) = collect(&mut source, 4);
    assert_eq!(status, ReadStatus::EndOfStream);
    assert!(messages.is_empty());
    let (status, _) = collect(&mut source, 4);
    assert_eq!(status, ReadStatus::EndOfStream);
  }

  #[test]
  fn timeout_returns_partial_batch() {
    let slot = FrameSlot::new();
    let mut source = Source::new(slot.clone(), SourceConfig { partition: 3 });
    slot.put(frame(8, 8));

    let (status, messages) = collect(&mut source, 5);
    assert_eq!(status, ReadStatus::Emitted(1));
    assert_eq!(messages[0].offset.partition_id, 3);
    assert_eq!(source.unacknowledged(), 1);
    assert_eq!(source.partitions(), vec![3]);
    assert_eq!(source.pending(), 0);
  }

  #[test]
  fn aborted_capture_is_an_error() {
    let slot = FrameSlot::new();
    let mut source = Source::new(slot.clone(), SourceConfig::default());
    slot.put(SlotItem::Aborted);
    assert!(matches!(
      source.read(1, None, |_| {}),
      Err(SourceError::CaptureAborted)
    ));
  }
}
