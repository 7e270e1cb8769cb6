// 该文件是 Beifeng （北风） 项目的一部分。
// src/main.rs - 流水线主程序
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

mod args;

use std::{sync::atomic::Ordering, thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use beifeng::{
  FromUrl,
  input::{CaptureSource, DefaultBackend, FrameReader, ReaderConfig},
  model::HttpDetector,
  output::ReceiverWrapper,
  task::{PipelineTask, Task},
  vertex::{Inference, ResizeConfig, Sink, SinkConfig, Source, SourceConfig},
};

fn main() -> Result<()> {
  let args = args::Args::parse();
  tracing_subscriber::fmt().with_max_level(args.log_level).init();

  info!("输入来源: {}", args.input);
  info!("检测服务: {}", args.detector);
  info!("接收端: {}", args.receiver_url);

  let capture_source = CaptureSource::from_url(&args.input)?;
  let detector = HttpDetector::from_url(&args.detector)?;
  let receiver = ReceiverWrapper::from_url(&args.receiver_url)?;

  let reader_config = ReaderConfig {
    failed_read_threshold: args.failed_read_threshold,
    reconnect_threshold: args.reconnect_threshold,
    jpeg_quality: args.jpeg_quality,
    target_fps: args.target_fps,
    ..ReaderConfig::default()
  };
  let reader = FrameReader::spawn(DefaultBackend, capture_source, reader_config)
    .context("无法打开输入来源")?;

  let task = PipelineTask::default()
    .with_batch_size(args.batch_size)
    .with_max_frames(args.max_frames)
    .with_resize(ResizeConfig {
      output_width: args.output_width,
      output_height: args.output_height,
      jpeg_quality: args.jpeg_quality,
    });

  let stop = task.stop_handle();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    stop.store(true, Ordering::Release);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let mut source = Source::new(reader, SourceConfig::default());
  let inference = Inference::new(detector);
  let sink = Sink::new(
    receiver,
    SinkConfig {
      jpeg_quality: args.jpeg_quality,
    },
  );
  let result = task.run_task(&mut source, inference, sink);

  let reader = source.into_feed();
  reader.stop();
  let captured = reader.join();

  match (result, captured) {
    (Ok(stats), Ok(frames)) => {
      info!(
        "处理完成: 采集 {} 帧, 读取 {} 帧, 缩放丢弃 {} 帧, 无检测 {} 帧, 送出 {} 帧",
        frames, stats.read, stats.resize_dropped, stats.inference_dropped, stats.delivered
      );
      Ok(())
    }
    (Ok(_), Err(e)) | (Err(_), Err(e)) => {
      error!("采集失败: {}", e);
      Err(e.into())
    }
    (Err(e), Ok(_)) => {
      error!("流水线失败: {}", e);
      Err(e)
    }
  }
}
