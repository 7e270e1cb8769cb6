// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/http_receiver.rs - HTTP 帧接收端客户端
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

use std::time::Duration;

use reqwest::blocking::{
  Client,
  multipart::{Form, Part},
};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{FrameReceiver, ReceiverAck, ReceiverError};
use crate::FromUrl;

const RECEIVER_PATH: &str = "frame_receiver";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// 以 multipart 表单把帧 POST 到 `{base}/frame_receiver`
///
/// 表单包含 `image`（`frame.jpg`, `image/jpeg`）与
/// `meta`（`meta.json`, `{"frame_idx": n}`）两部分。
pub struct HttpReceiver {
  client: Client,
  endpoint: String,
}

impl HttpReceiver {
  pub fn new(base: &Url) -> Result<Self, ReceiverError> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    Ok(Self {
      client,
      endpoint: endpoint_for(base),
    })
  }
}

fn endpoint_for(base: &Url) -> String {
  format!("{}/{}", base.as_str().trim_end_matches('/'), RECEIVER_PATH)
}

impl FromUrl for HttpReceiver {
  type Error = ReceiverError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Self::new(url),
      other => Err(ReceiverError::SchemeMismatch(other.to_string())),
    }
  }
}

impl FrameReceiver for HttpReceiver {
  fn send_frame(&self, frame_idx: i64, jpeg: &[u8]) -> Result<ReceiverAck, ReceiverError> {
    let meta = serde_json::json!({ "frame_idx": frame_idx }).to_string();
    let form = Form::new()
      .part(
        "image",
        Part::bytes(jpeg.to_vec())
          .file_name("frame.jpg")
          .mime_str("image/jpeg")?,
      )
      .part(
        "meta",
        Part::bytes(meta.into_bytes())
          .file_name("meta.json")
          .mime_str("application/json")?,
      );

    let response = self.client.post(&self.endpoint).multipart(form).send()?;
    let status = response.status();
    if !status.is_success() {
      return Err(ReceiverError::Status(status.as_u16()));
    }

    let body = response.text()?;
    let ack = parse_ack(&body)?;
    debug!("接收端确认 frame_idx={}: {:?}", frame_idx, ack.count);
    Ok(ack)
  }
}

fn parse_ack(body: &str) -> Result<ReceiverAck, ReceiverError> {
  if body.trim().is_empty() {
    return Ok(ReceiverAck::default());
  }
  let value: Value =
    serde_json::from_str(body).map_err(|e| ReceiverError::InvalidResponse(e.to_string()))?;
  Ok(ReceiverAck {
    count: value.get("count").and_then(Value::as_u64),
  })
}
