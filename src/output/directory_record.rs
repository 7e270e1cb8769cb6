// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/directory_record.rs - 目录记录接收端
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
  path::PathBuf,
  sync::atomic::{AtomicU64, Ordering},
};

use chrono::{Datelike, Utc};
use tracing::debug;
use url::Url;

use super::{FrameReceiver, ReceiverAck, ReceiverError};
use crate::{FromUrl, FromUrlWithScheme};

/// 把帧写入本地目录，代替远端接收端
///
/// 目录结构为 `<root>/YYYY/MM/DD/<frame_idx>.jpg`，旁边附带同名 `.json` 元数据。
pub struct DirectoryRecordReceiver {
  directory: PathBuf,
  count: AtomicU64,
}

impl FromUrlWithScheme for DirectoryRecordReceiver {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordReceiver {
  type Error = ReceiverError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ReceiverError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(Self::new(uri.path()))
  }
}

impl DirectoryRecordReceiver {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      count: AtomicU64::new(0),
    }
  }

  fn day_directory(&self) -> Result<PathBuf, ReceiverError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;
    Ok(directory)
  }
}

impl FrameReceiver for DirectoryRecordReceiver {
  fn send_frame(&self, frame_idx: i64, jpeg: &[u8]) -> Result<ReceiverAck, ReceiverError> {
    let directory = self.day_directory()?;
    let stem = format!("{:08}", frame_idx);
    let image_path = directory.join(format!("{}.jpg", stem));
    std::fs::write(&image_path, jpeg)?;
    let meta = serde_json::json!({ "frame_idx": frame_idx, "saved_at": Utc::now().to_rfc3339() });
    std::fs::write(directory.join(format!("{}.json", stem)), meta.to_string())?;

    let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
    debug!("保存帧到 {}", image_path.display());
    Ok(ReceiverAck { count: Some(count) })
  }
}
