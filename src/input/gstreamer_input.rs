// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频采集
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

//! # GStreamer 视频采集
//!
//! 视频文件使用 `filesrc ! decodebin`，直播流使用 `uridecodebin`，
//! 统一转换为 RGB 后由 appsink 输出。
//!
//! ## 系统依赖
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! 文件源的 appsink 不丢帧，由采集循环自行控制节奏；
//! 直播流的 appsink 只保留最新一帧。

use std::time::Duration;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CaptureError, CaptureSource, VideoCapture};

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("无法获取 appsink 元素")]
  AppSinkNotFound,
  #[error("无法转换元素为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("文件不存在: {0}")]
  FileNotFound(String),
}

// 单次拉取的等待上限，超时按一次读失败计
const PULL_TIMEOUT: Duration = Duration::from_secs(2);
const PREROLL_TIMEOUT: Duration = Duration::from_secs(5);

enum PipelineItem {
  FileSource(String),
  UriSource(String),
  TargetFormat { format: &'static str },
  AppSink { drop: bool },
}

impl PipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      PipelineItem::UriSource(uri) => format!("uridecodebin uri=\"{}\"", uri),
      PipelineItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      PipelineItem::AppSink { drop } => {
        if *drop {
          "appsink name=sink sync=false max-buffers=1 drop=true".to_string()
        } else {
          "appsink name=sink sync=false max-buffers=2 drop=false".to_string()
        }
      }
    }
  }
}

fn pipeline_items(source: &CaptureSource) -> Result<Vec<PipelineItem>, GStreamerInputError> {
  let (head, drop) = match source {
    CaptureSource::File(path) => {
      if !path.is_file() {
        return Err(GStreamerInputError::FileNotFound(
          path.display().to_string(),
        ));
      }
      (PipelineItem::FileSource(path.display().to_string()), false)
    }
    CaptureSource::Stream(url) => (PipelineItem::UriSource(url.to_string()), true),
    CaptureSource::Image(_) => {
      return Err(GStreamerInputError::PipelineError(
        "静态图像不经过 GStreamer".to_string(),
      ));
    }
  };
  Ok(vec![
    head,
    PipelineItem::TargetFormat { format: "RGB" },
    PipelineItem::AppSink { drop },
  ])
}

/// 基于 GStreamer appsink 的采集句柄
pub struct GStreamerCapture {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  live: bool,
  duration: Option<Duration>,
}

impl Drop for GStreamerCapture {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl GStreamerCapture {
  pub fn open(source: &CaptureSource) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let description = pipeline_items(source)?
      .iter()
      .map(PipelineItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    let live = source.is_live();
    let mut duration = None;
    if !live {
      // 等待预滚动完成后才能查询时长
      let (result, _, _) = pipeline.state(gst::ClockTime::from_nseconds(
        PREROLL_TIMEOUT.as_nanos() as u64,
      ));
      result?;
      duration = pipeline
        .query_duration::<gst::ClockTime>()
        .map(|t| Duration::from_nanos(t.nseconds()));
    }

    let capture = Self {
      pipeline,
      appsink,
      live,
      duration,
    };
    capture.check_bus()?;
    Ok(capture)
  }

  fn check_bus(&self) -> Result<(), GStreamerInputError> {
    let Some(bus) = self.pipeline.bus() else {
      return Ok(());
    };
    while let Some(message) = bus.pop_filtered(&[gst::MessageType::Error]) {
      if let gst::MessageView::Error(err) = message.view() {
        return Err(GStreamerInputError::PipelineError(format!(
          "{} ({:?})",
          err.error(),
          err.debug()
        )));
      }
    }
    Ok(())
  }
}

impl VideoCapture for GStreamerCapture {
  fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
    self.check_bus()?;

    let timeout = gst::ClockTime::from_nseconds(PULL_TIMEOUT.as_nanos() as u64);
    match self.appsink.try_pull_sample(timeout) {
      Some(sample) => Ok(Some(convert_sample_to_rgb(&sample)?)),
      None if self.appsink.is_eos() => {
        if self.live {
          // 直播流不应结束，按读失败处理以触发重连
          Err(CaptureError::Read("直播流收到 EOS".to_string()))
        } else {
          debug!("文件源读取完毕");
          Ok(None)
        }
      }
      None => Err(CaptureError::Read(format!(
        "{:?} 内未收到帧",
        PULL_TIMEOUT
      ))),
    }
  }

  fn duration(&self) -> Option<Duration> {
    self.duration
  }
}

fn convert_sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  // 每行可能带有对齐填充
  let expected = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(width * height * 3);
  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      for row in 0..height {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + width * 3]);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for row in 0..height {
        let start = row * stride;
        for bgr in data[start..start + width * 3].chunks_exact(3) {
          pixels.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
        }
      }
    }
    other => return Err(GStreamerInputError::UnsupportedFormat(other)),
  }

  RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: width * height * 3,
      actual: 0,
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  #[test]
  fn file_pipeline_keeps_every_frame() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let items = pipeline_items(&CaptureSource::File(file.path().to_path_buf())).unwrap();
    let description = items
      .iter()
      .map(PipelineItem::to_pipeline)
      .collect::<Vec<_>>()
      .join(" ! ");
    assert!(description.starts_with("filesrc location="));
    assert!(description.contains("video/x-raw,format=RGB"));
    assert!(description.ends_with("drop=false"));
  }

  #[test]
  fn stream_pipeline_drops_stale_frames() {
    let url = url::Url::parse("rtsp://10.0.0.5:8554/cam").unwrap();
    let items = pipeline_items(&CaptureSource::Stream(url)).unwrap();
    assert!(items[0].to_pipeline().contains("uridecodebin uri=\"rtsp://10.0.0.5:8554/cam\""));
    assert!(items[2].to_pipeline().contains("drop=true"));
  }

  #[test]
  fn missing_file_is_rejected_before_launch() {
    let result = pipeline_items(&CaptureSource::File(PathBuf::from(
      "/nonexistent/video.mp4",
    )));
    assert!(matches!(result, Err(GStreamerInputError::FileNotFound(_))));
  }
}
