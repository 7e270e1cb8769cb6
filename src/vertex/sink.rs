// 该文件是 Beifeng （北风） 项目的一部分。
// src/vertex/sink.rs - 汇顶点
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use super::{Datum, FRAME_IDX, read_boxes};
use crate::{
  frame::{FrameError, decode_image, encode_jpeg},
  keys::KeyError,
  output::{FrameReceiver, ReceiverAck, ReceiverError, draw::Draw},
};

#[derive(Error, Debug)]
pub enum SinkError {
  #[error("元数据错误: {0}")]
  KeyError(#[from] KeyError),
  #[error("帧编解码错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("接收端错误: {0}")]
  ReceiverError(#[from] ReceiverError),
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
  pub jpeg_quality: u8,
}

impl Default for SinkConfig {
  fn default() -> Self {
    Self { jpeg_quality: 90 }
  }
}

/// 观察每一帧叠加前后的图像：`(frame_idx, input, output)`
pub type FrameCapture = Box<dyn Fn(i64, &RgbImage, &RgbImage) + Send + Sync>;

/// 读出检测框并叠加到帧上，再交给接收端
///
/// 接收端返回非成功状态时整个汇顶点无法继续，错误向上返回。
pub struct Sink<R> {
  receiver: R,
  config: SinkConfig,
  draw: Draw,
  frame_capture: Option<FrameCapture>,
}

impl<R: FrameReceiver> Sink<R> {
  pub fn new(receiver: R, config: SinkConfig) -> Self {
    info!("汇顶点初始化");
    Self {
      receiver,
      config,
      draw: Draw::default(),
      frame_capture: None,
    }
  }

  pub fn with_frame_capture(mut self, capture: FrameCapture) -> Self {
    self.frame_capture = Some(capture);
    self
  }

  pub fn process(&self, datum: &Datum) -> Result<ReceiverAck, SinkError> {
    let keys = datum.vertex_keys()?;
    debug!("{}", keys);
    let frame_idx = keys.get_i64(FRAME_IDX)?;
    let boxes = read_boxes(&keys)?;
    for (i, bbox) in boxes.iter().enumerate() {
      info!(
        "frame_index: {}, bbox {}: confidence: {}, class_id: {}, LeftUp: ({}, {}), RightDown: ({}, {})",
        frame_idx,
        i,
        bbox.confidence,
        bbox.class_id,
        bbox.left_up_x,
        bbox.left_up_y,
        bbox.right_down_x,
        bbox.right_down_y
      );
    }

    let input = decode_image(&datum.value)?;
    let mut output = input.clone();
    self.draw.draw_boxes(&mut output, &boxes, frame_idx);

    if let Some(capture) = &self.frame_capture {
      capture(frame_idx, &input, &output);
    }

    let jpeg = encode_jpeg(&output, self.config.jpeg_quality)?;
    let ack = self.receiver.send_frame(frame_idx, &jpeg)?;
    if let Some(count) = ack.count {
      debug!("接收端帧计数: {}", count);
    }
    Ok(ack)
  }

  /// 依次处理一批输入，遇到错误立即返回
  pub fn process_batch(&self, datums: &[Datum]) -> Result<Vec<ReceiverAck>, SinkError> {
    datums.iter().map(|datum| self.process(datum)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    keys::VertexKeys,
    model::{ClassId, DetectItem, DetectResult},
    vertex::append_boxes,
  };
  use std::sync::{Arc, Mutex};

  #[derive(Default)]
  struct Recording {
    frames: Mutex<Vec<(i64, usize)>>,
    status: Option<u16>,
  }

  impl FrameReceiver for Arc<Recording> {
    fn send_frame(&self, frame_idx: i64, jpeg: &[u8]) -> Result<ReceiverAck, ReceiverError> {
      if let Some(status) = self.status {
        return Err(ReceiverError::Status(status));
      }
      let mut frames = self.frames.lock().unwrap();
      frames.push((frame_idx, jpeg.len()));
      Ok(ReceiverAck {
        count: Some(frames.len() as u64),
      })
    }
  }

  fn datum(boxes: &[[f32; 4]]) -> Datum {
    let mut keys = VertexKeys::new();
    keys.set(FRAME_IDX, 21i64).unwrap();
    let result = DetectResult::from(
      boxes
        .iter()
        .map(|bbox| DetectItem {
          kind: ClassId::Id(1),
          score: 0.8,
          bbox: *bbox,
        })
        .collect::<Vec<_>>(),
    );
    append_boxes(&mut keys, &result).unwrap();
    Datum::new(
      encode_jpeg(&RgbImage::new(200, 200), 90).unwrap(),
      keys.to_keys(),
    )
  }

  #[test]
  fn overlays_and_forwards_to_receiver() {
    let receiver = Arc::new(Recording::default());
    let seen = Arc::new(Mutex::new(None));
    let seen_in_hook = Arc::clone(&seen);
    let sink = Sink::new(Arc::clone(&receiver), SinkConfig::default()).with_frame_capture(
      Box::new(move |idx, input, output| {
        let changed = input
          .pixels()
          .zip(output.pixels())
          .filter(|(a, b)| a != b)
          .count();
        *seen_in_hook.lock().unwrap() = Some((idx, changed));
      }),
    );

    let ack = sink.process(&datum(&[[0.1, 0.1, 0.6, 0.6]])).unwrap();
    assert_eq!(ack.count, Some(1));
    assert_eq!(receiver.frames.lock().unwrap()[0].0, 21);
    let (idx, changed) = seen.lock().unwrap().unwrap();
    assert_eq!(idx, 21);
    assert!(changed > 0);
  }

  #[test]
  fn missing_box_len_is_rejected() {
    let receiver = Arc::new(Recording::default());
    let sink = Sink::new(Arc::clone(&receiver), SinkConfig::default());
    let mut keys = VertexKeys::new();
    keys.set(FRAME_IDX, 4i64).unwrap();
    let input = Datum::new(
      encode_jpeg(&RgbImage::new(32, 32), 90).unwrap(),
      keys.to_keys(),
    );
    assert!(matches!(
      sink.process(&input),
      Err(SinkError::KeyError(KeyError::KeyNotFound(key))) if key == "box_len"
    ));
    assert!(receiver.frames.lock().unwrap().is_empty());
  }

  #[test]
  fn batch_is_forwarded_in_order() {
    let receiver = Arc::new(Recording::default());
    let sink = Sink::new(Arc::clone(&receiver), SinkConfig::default());
    let acks = sink
      .process_batch(&[datum(&[[0.1, 0.1, 0.6, 0.6]]), datum(&[[5.0, 5.0, 50.0, 50.0]])])
      .unwrap();
    assert_eq!(acks.len(), 2);
    assert_eq!(receiver.frames.lock().unwrap().len(), 2);
  }

  #[test]
  fn receiver_rejection_is_fatal() {
    let receiver = Arc::new(Recording {
      status: Some(503),
      ..Recording::default()
    });
    let sink = Sink::new(receiver, SinkConfig::default());
    assert!(matches!(
      sink.process(&datum(&[[0.1, 0.1, 0.6, 0.6]])),
      Err(SinkError::ReceiverError(ReceiverError::Status(503)))
    ));
  }
}
