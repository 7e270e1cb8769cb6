// 该文件是 Beifeng （北风） 项目的一部分。
// src/bin/capture_pace.rs - 仅运行采集，统计发帧节奏
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

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use url::Url;

use beifeng::{
  FromUrl,
  input::{CaptureSource, DefaultBackend, FrameReader, ReaderConfig, SlotItem},
};
use tracing::{info, warn};

/// 采集探测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 文件源的目标帧率
  #[arg(long, default_value_t = 20.0, value_name = "FPS")]
  pub target_fps: f64,

  /// 读取帧数，缺省时读到结束
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("输入来源: {}", args.input);

  let source = CaptureSource::from_url(&args.input)?;
  let reader = FrameReader::spawn(
    DefaultBackend,
    source,
    ReaderConfig {
      target_fps: args.target_fps,
      ..ReaderConfig::default()
    },
  )?;

  let started = Instant::now();
  let mut last = started;
  let mut gaps = Vec::new();
  while args.frame_number.is_none_or(|n| (gaps.len() as u64) < n) {
    match reader.next_frame_timeout(Duration::from_secs(5)) {
      Some(SlotItem::Frame(frame)) => {
        let now = Instant::now();
        gaps.push(now - last);
        last = now;
        info!(
          "第 {} 帧: {}x{}, {} 字节, 间隔 {:.2?}",
          gaps.len(),
          frame.width(),
          frame.height(),
          frame.as_compressed_frame().len(),
          gaps[gaps.len() - 1]
        );
      }
      Some(SlotItem::EndOfStream) => {
        info!("帧源已结束");
        break;
      }
      Some(SlotItem::Aborted) => {
        warn!("采集异常终止");
        break;
      }
      None => warn!("5 秒内没有新帧"),
    }
  }

  reader.stop();
  let emitted = reader.join()?;
  if gaps.len() > 1 {
    // 首帧间隔包含打开耗时
    let steady = gaps.iter().skip(1).sum::<Duration>() / (gaps.len() - 1) as u32;
    info!(
      "共取得 {} 帧 (采集 {} 帧), 总耗时 {:.2?}, 平均间隔 {:.2?}",
      gaps.len(),
      emitted,
      started.elapsed(),
      steady
    );
  }
  Ok(())
}
