// 该文件是 Beifeng （北风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use tracing::Level;
use url::Url;

/// Beifeng 流水线参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 视频文件: file:///path/video.mp4
  /// - 视频流: rtsp://, rtsps://, http://, https://, udp://, srt://
  /// - 单张图片: image:///path/frame.png
  #[arg(long, env = "VIDEO_SOURCE", value_name = "SOURCE")]
  pub input: Url,

  /// 帧接收端地址（http/https 或 folder:///path）
  #[arg(long, env = "RECEIVER_URL", value_name = "RECEIVER")]
  pub receiver_url: Url,

  /// 检测服务地址
  #[arg(long, env = "DETECTOR_URL", value_name = "DETECTOR")]
  pub detector: Url,

  /// JPEG 压缩质量 (1 - 100)
  #[arg(long, env = "JPEG_QUALITY", default_value_t = 90, value_name = "QUALITY")]
  pub jpeg_quality: u8,

  /// 缩放输出宽度
  #[arg(long, env = "FR_OUTPUT_WIDTH", default_value_t = 416, value_name = "WIDTH")]
  pub output_width: u32,

  /// 缩放输出高度
  #[arg(long, env = "FR_OUTPUT_HEIGHT", default_value_t = 416, value_name = "HEIGHT")]
  pub output_height: u32,

  /// 文件源的目标帧率（不大于 0 表示不限速）
  #[arg(long, default_value_t = 20.0, value_name = "FPS")]
  pub target_fps: f64,

  /// 连续读失败阈值
  #[arg(long, default_value_t = 30, value_name = "COUNT")]
  pub failed_read_threshold: u32,

  /// 连续重连次数上限
  #[arg(long, default_value_t = 5, value_name = "COUNT")]
  pub reconnect_threshold: u32,

  /// 每批读取的消息数
  #[arg(long, default_value_t = 1, value_name = "COUNT")]
  pub batch_size: usize,

  /// 最大处理帧数，缺省时不限制
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<u64>,

  /// 日志级别: trace, debug, info, warn, error
  #[arg(long, env = "LOGGER_LOG_LEVEL", default_value_t = Level::INFO, value_name = "LEVEL")]
  pub log_level: Level,
}
