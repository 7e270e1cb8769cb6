// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/http_detector.rs - 通过 HTTP 推理服务进行检测
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

//! 推理服务协议：以 `image/jpeg` 请求体 POST 帧，响应为
//!
//! ```json
//! [{"confidence": 0.92, "class_id": 0, "bbox": [x1, y1, x2, y2]}]
//! ```
//!
//! 空数组（或 `[[]]`）表示没有检测。

use std::time::Duration;

use image::RgbImage;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{ClassId, DetectError, DetectItem, DetectResult, Detector};
use crate::{FromUrl, frame::encode_jpeg};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_QUALITY: u8 = 95;

pub struct HttpDetector {
  client: Client,
  endpoint: Url,
}

impl HttpDetector {
  pub fn new(endpoint: Url) -> Result<Self, DetectError> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    Ok(Self { client, endpoint })
  }
}

impl FromUrl for HttpDetector {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Self::new(url.clone()),
      other => Err(DetectError::InvalidResponse(format!(
        "不支持的推理服务 scheme: {}",
        other
      ))),
    }
  }
}

impl Detector for HttpDetector {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
    let body = encode_jpeg(image, UPLOAD_QUALITY)?;
    let response = self
      .client
      .post(self.endpoint.clone())
      .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
      .body(body)
      .send()?;

    let status = response.status();
    if !status.is_success() {
      return Err(DetectError::Status(status.as_u16()));
    }
    let value: Value = response.json()?;
    let result = parse_detections(&value)?;
    debug!("推理服务返回 {} 个检测框", result.len());
    Ok(result)
  }
}

pub(crate) fn parse_detections(value: &Value) -> Result<DetectResult, DetectError> {
  let entries = value
    .as_array()
    .ok_or_else(|| DetectError::InvalidResponse("响应不是数组".to_string()))?;

  // `[[]]` 与 `[]` 同为无检测
  if let [Value::Array(inner)] = entries.as_slice()
    && inner.is_empty()
  {
    return Ok(DetectResult::empty());
  }

  entries
    .iter()
    .enumerate()
    .map(|(idx, entry)| parse_item(entry).map_err(|reason| {
      DetectError::InvalidResponse(format!("第 {} 项: {}", idx, reason))
    }))
    .collect::<Result<Vec<_>, _>>()
    .map(DetectResult::from)
}

fn parse_item(entry: &Value) -> Result<DetectItem, String> {
  let score = entry
    .get("confidence")
    .and_then(Value::as_f64)
    .ok_or("缺少 confidence")?;

  let kind = match entry.get("class_id") {
    Some(Value::Number(n)) => ClassId::Id(n.as_i64().ok_or("class_id 不是整数")?),
    Some(Value::String(s)) => ClassId::Name(s.clone()),
    _ => return Err("缺少 class_id".to_string()),
  };

  let coords = entry
    .get("bbox")
    .and_then(Value::as_array)
    .ok_or("缺少 bbox")?;
  let [x1, y1, x2, y2] = coords.as_slice() else {
    return Err(format!("bbox 应有 4 个值，实际 {} 个", coords.len()));
  };
  let mut bbox = [0f32; 4];
  for (slot, v) in bbox.iter_mut().zip([x1, y1, x2, y2]) {
    *slot = v.as_f64().ok_or("bbox 含非数值")? as f32;
  }

  Ok(DetectItem {
    kind,
    score: score as f32,
    bbox,
  })
}
