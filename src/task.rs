// 该文件是 Beifeng （北风） 项目的一部分。
// src/task.rs - 进程内流水线任务
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  model::Detector,
  output::FrameReceiver,
  vertex::{
    Datum, FilterResize, FrameFeed, Inference, MapOutput, MapStage, ReadStatus, ResizeConfig, Sink,
    Source, SourceMessage,
  },
};

pub trait Task<S, M, O>: Sized {
  type Error;
  fn run_task(self, source: S, model: M, output: O) -> Result<PipelineStats, Self::Error>;
}

/// 任务结束时的计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
  /// 源顶点发出的消息数
  pub read: u64,
  /// 缩放顶点丢弃的消息数
  pub resize_dropped: u64,
  /// 推理顶点丢弃的消息数（无检测结果）
  pub inference_dropped: u64,
  /// 交给接收端的帧数
  pub delivered: u64,
}

/// 在同一进程内依次驱动 源 → 缩放 → 推理 → 汇
///
/// 每批消息全部处理完后才确认 offset，因此同一时刻只有一批在途。
pub struct PipelineTask {
  batch_size: usize,
  read_timeout: Duration,
  max_frames: Option<u64>,
  resize: ResizeConfig,
  stop: Arc<AtomicBool>,
}

impl Default for PipelineTask {
  fn default() -> Self {
    Self {
      batch_size: 1,
      read_timeout: Duration::from_millis(500),
      max_frames: None,
      resize: ResizeConfig::default(),
      stop: Arc::new(AtomicBool::new(false)),
    }
  }
}

impl PipelineTask {
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
    self.read_timeout = read_timeout;
    self
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn with_resize(mut self, resize: ResizeConfig) -> Self {
    self.resize = resize;
    self
  }

  /// 置位后任务在当前批次结束时退出
  pub fn stop_handle(&self) -> Arc<AtomicBool> {
    Arc::clone(&self.stop)
  }

  fn should_stop(&self, stats: &PipelineStats) -> bool {
    if self.stop.load(Ordering::Acquire) {
      warn!("收到停止请求，退出任务循环");
      return true;
    }
    if self.max_frames.is_some_and(|n| stats.read >= n) {
      info!("达到指定帧数 {}, 退出任务循环", stats.read);
      return true;
    }
    false
  }
}

impl<'a, F, D, R> Task<&'a mut Source<F>, Inference<D>, Sink<R>> for PipelineTask
where
  F: FrameFeed,
  D: Detector,
  R: FrameReceiver,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    source: &'a mut Source<F>,
    model: Inference<D>,
    output: Sink<R>,
  ) -> Result<PipelineStats, Self::Error> {
    info!("开始任务...");
    let resize = FilterResize::new(self.resize.clone());
    let mut stats = PipelineStats::default();

    while !self.should_stop(&stats) {
      let want = match self.max_frames {
        Some(n) => n.saturating_sub(stats.read).min(self.batch_size as u64) as usize,
        None => self.batch_size,
      };
      let mut batch: Vec<SourceMessage> = Vec::with_capacity(want);
      match source.read(want, Some(self.read_timeout), |message| batch.push(message))? {
        ReadStatus::EndOfStream => {
          info!("帧源结束，退出任务循环");
          break;
        }
        ReadStatus::Pending => anyhow::bail!("存在未确认的 offset"),
        ReadStatus::Emitted(0) => continue,
        ReadStatus::Emitted(n) => debug!("读取 {} 条消息", n),
      }

      let mut offsets = Vec::with_capacity(batch.len());
      for message in batch {
        offsets.push(message.offset.clone());
        stats.read += 1;
        let datum = Datum::from(message);

        let now = Instant::now();
        let resized = match resize.process(&datum)? {
          MapOutput::Forward(message) => datum.follow(message),
          MapOutput::Drop => {
            stats.resize_dropped += 1;
            continue;
          }
        };
        let elapsed_resize = now.elapsed();

        let annotated = match model.process(&resized)? {
          MapOutput::Forward(message) => resized.follow(message),
          MapOutput::Drop => {
            debug!("无检测结果，丢弃该帧");
            stats.inference_dropped += 1;
            continue;
          }
        };
        let elapsed_infer = now.elapsed();

        output.process(&annotated)?;
        stats.delivered += 1;
        info!(
          "处理完成，耗时: {:.2?} / {:.2?} / {:.2?}",
          elapsed_resize,
          elapsed_infer,
          now.elapsed()
        );
      }
      source.ack(&offsets)?;
    }

    info!(
      "任务完成，读取 {} 帧，送出 {} 帧",
      stats.read, stats.delivered
    );
    Ok(stats)
  }
}
