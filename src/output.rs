// 该文件是 Beifeng （北风） 项目的一部分。
// src/output.rs - 帧接收端定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub mod draw;

mod directory_record;
pub use self::directory_record::DirectoryRecordReceiver;

mod http_receiver;
pub use self::http_receiver::HttpReceiver;

#[derive(Error, Debug)]
pub enum ReceiverError {
  #[error("HTTP 请求错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("接收端返回状态 {0}")]
  Status(u16),
  #[error("无法解析接收端响应: {0}")]
  InvalidResponse(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 接收端对一帧的确认
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverAck {
  /// 接收端累计收到的帧数（如果接收端报告）
  pub count: Option<u64>,
}

/// 接收叠加检测框后的帧
pub trait FrameReceiver {
  fn send_frame(&self, frame_idx: i64, jpeg: &[u8]) -> Result<ReceiverAck, ReceiverError>;
}

impl<R: FrameReceiver + ?Sized> FrameReceiver for Box<R> {
  fn send_frame(&self, frame_idx: i64, jpeg: &[u8]) -> Result<ReceiverAck, ReceiverError> {
    (**self).send_frame(frame_idx, jpeg)
  }
}

pub enum ReceiverWrapper {
  Http(HttpReceiver),
  DirectoryRecord(DirectoryRecordReceiver),
}

impl FromUrl for ReceiverWrapper {
  type Error = ReceiverError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Ok(ReceiverWrapper::Http(HttpReceiver::from_url(url)?)),
      DirectoryRecordReceiver::SCHEME => Ok(ReceiverWrapper::DirectoryRecord(
        DirectoryRecordReceiver::from_url(url)?,
      )),
      other => Err(ReceiverError::SchemeMismatch(other.to_string())),
    }
  }
}

impl FrameReceiver for ReceiverWrapper {
  fn send_frame(&self, frame_idx: i64, jpeg: &[u8]) -> Result<ReceiverAck, ReceiverError> {
    match self {
      ReceiverWrapper::Http(receiver) => receiver.send_frame(frame_idx, jpeg),
      ReceiverWrapper::DirectoryRecord(receiver) => receiver.send_frame(frame_idx, jpeg),
    }
  }
}
