// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/reader.rs - 异步帧采集循环
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

//! 采集线程：打开采集源，逐帧压缩后放入单槽缓冲。
//!
//! 状态机：
//!
//! - `Opening`：重新获取采集句柄（首次打开在 [`FrameReader::spawn`] 中同步完成，失败直接返回错误）
//! - `Running`：逐帧读取；直播流连续读失败超过阈值后回到 `Opening`
//! - `Draining`：有限源读完，放入结束标记后退出
//!
//! 重连次数超过上限时线程以错误退出，并在槽中放入 [`SlotItem::Aborted`]。

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use super::{CaptureBackend, CaptureError, CaptureSource, VideoCapture};
use crate::{frame::CapturedFrame, slot::FrameSlot};

/// 槽中交接的条目
#[derive(Debug)]
pub enum SlotItem {
  Frame(CapturedFrame),
  /// 有限源读完或采集被停止
  EndOfStream,
  /// 采集线程因致命错误退出，错误可通过 [`FrameReader::join`] 取得
  Aborted,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
  /// 连续读失败超过该次数后重连（直播流）或终止（文件）
  pub failed_read_threshold: u32,
  /// 连续重连次数上限
  pub reconnect_threshold: u32,
  /// 第 n 次重连前等待 `reconnect_backoff × n`
  pub reconnect_backoff: Duration,
  pub jpeg_quality: u8,
  /// 文件源的目标帧率，不大于 0 时不限速
  pub target_fps: f64,
}

impl Default for ReaderConfig {
  fn default() -> Self {
    Self {
      failed_read_threshold: 30,
      reconnect_threshold: 5,
      reconnect_backoff: Duration::from_secs(1),
      jpeg_quality: 90,
      target_fps: 20.0,
    }
  }
}

impl ReaderConfig {
  fn frame_period(&self) -> Option<Duration> {
    (self.target_fps > 0.0).then(|| Duration::from_secs_f64(1.0 / self.target_fps))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Opening,
  Running,
  Draining,
}

/// 采集线程句柄
pub struct FrameReader {
  slot: FrameSlot<SlotItem>,
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<Result<u64, CaptureError>>>,
}

impl FrameReader {
  /// 同步打开采集源并启动采集线程
  pub fn spawn<B>(
    backend: B,
    source: CaptureSource,
    config: ReaderConfig,
  ) -> Result<Self, CaptureError>
  where
    B: CaptureBackend + 'static,
  {
    let capture = backend.open(&source).map_err(|e| {
      error!("无法打开采集源 {}: {}", source, e);
      e
    })?;
    info!("采集源已打开: {}", source);

    let slot = FrameSlot::new();
    let stop = Arc::new(AtomicBool::new(false));
    let frame_period = if source.is_live() {
      None
    } else {
      config.frame_period()
    };

    let worker = AcquisitionLoop {
      backend,
      source,
      config,
      frame_period,
      capture: Some(capture),
      slot: slot.clone(),
      stop: Arc::clone(&stop),
      failed_reads: 0,
      reconnects: 0,
      emitted: 0,
      last_emit: None,
    };
    let handle = thread::Builder::new()
      .name("frame-reader".to_string())
      .spawn(move || worker.run())
      .map_err(|e| CaptureError::Open {
        location: "frame-reader".to_string(),
        reason: e.to_string(),
      })?;

    Ok(Self {
      slot,
      stop,
      handle: Some(handle),
    })
  }

  /// 阻塞等待下一条目
  pub fn next_frame(&self) -> SlotItem {
    self.slot.take()
  }

  pub fn next_frame_timeout(&self, timeout: Duration) -> Option<SlotItem> {
    self.slot.take_timeout(timeout)
  }

  /// 请求停止；正在阻塞的读取无法被打断，在下一轮循环生效
  pub fn stop(&self) {
    self.stop.store(true, Ordering::Release);
  }

  /// 等待采集线程退出，返回已放入槽中的帧数
  pub fn join(mut self) -> Result<u64, CaptureError> {
    match self.handle.take() {
      Some(handle) => handle.join().map_err(|_| CaptureError::WorkerPanicked)?,
      None => Ok(0),
    }
  }
}

impl Drop for FrameReader {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::Release);
  }
}

struct AcquisitionLoop<B> {
  backend: B,
  source: CaptureSource,
  config: ReaderConfig,
  frame_period: Option<Duration>,
  capture: Option<Box<dyn VideoCapture>>,
  slot: FrameSlot<SlotItem>,
  stop: Arc<AtomicBool>,
  failed_reads: u32,
  reconnects: u32,
  emitted: u64,
  last_emit: Option<Instant>,
}

impl<B: CaptureBackend> AcquisitionLoop<B> {
  fn run(mut self) -> Result<u64, CaptureError> {
    let result = self.drive();
    self.capture = None;
    match &result {
      Ok(frames) => info!("采集结束 {}: 共 {} 帧", self.source, frames),
      Err(e) => {
        error!("采集失败 {}: {}", self.source, e);
        self.slot.put_last(SlotItem::Aborted);
      }
    }
    result
  }

  fn drive(&mut self) -> Result<u64, CaptureError> {
    if let Some(capture) = &self.capture {
      if let Some(count) = capture.frame_count() {
        info!("总帧数: {}", count);
      }
      if let Some(duration) = capture.duration() {
        info!("总时长: {:.2}s", duration.as_secs_f64());
      }
    }

    let mut state = State::Running;
    loop {
      if self.stop.load(Ordering::Acquire) {
        info!("收到停止请求");
        self.slot.put_last(SlotItem::EndOfStream);
        return Ok(self.emitted);
      }
      state = match state {
        State::Opening => self.reopen()?,
        State::Running => self.step()?,
        State::Draining => {
          self.slot.put_last(SlotItem::EndOfStream);
          return Ok(self.emitted);
        }
      };
    }
  }

  fn step(&mut self) -> Result<State, CaptureError> {
    let Some(capture) = self.capture.as_mut() else {
      return Ok(State::Opening);
    };

    let failure = match capture.read_frame() {
      Ok(Some(image)) => {
        self.failed_reads = 0;
        self.reconnects = 0;
        let frame = CapturedFrame::compress(image, self.config.jpeg_quality)?;
        self.emit(frame);
        return Ok(State::Running);
      }
      Ok(None) if !self.source.is_live() => {
        info!("文件读取完毕: {}", self.source);
        return Ok(State::Draining);
      }
      Ok(None) => "直播流没有更多数据".to_string(),
      Err(e) => e.to_string(),
    };

    self.failed_reads += 1;
    warn!(
      "读取帧失败 ({}/{}): {}",
      self.failed_reads, self.config.failed_read_threshold, failure
    );
    if self.failed_reads <= self.config.failed_read_threshold {
      return Ok(State::Running);
    }
    if self.source.is_live() {
      // 释放旧句柄后重连
      self.capture = None;
      Ok(State::Opening)
    } else {
      Err(CaptureError::ReadFailures {
        count: self.failed_reads,
      })
    }
  }

  fn reopen(&mut self) -> Result<State, CaptureError> {
    let limit = self.config.reconnect_threshold;
    if self.reconnects >= limit {
      return Err(CaptureError::ReconnectExhausted {
        attempts: self.reconnects,
        limit,
      });
    }
    self.reconnects += 1;

    let backoff = self.config.reconnect_backoff * self.reconnects;
    info!(
      "第 {}/{} 次重连 {}，等待 {:?}",
      self.reconnects, limit, self.source, backoff
    );
    thread::sleep(backoff);

    match self.backend.open(&self.source) {
      Ok(capture) => {
        info!("重连成功: {}", self.source);
        self.capture = Some(capture);
        self.failed_reads = 0;
        Ok(State::Running)
      }
      Err(e) => {
        warn!("重连失败: {}", e);
        Ok(State::Opening)
      }
    }
  }

  fn emit(&mut self, frame: CapturedFrame) {
    // 文件源按目标帧率限速，直播流由源自身控制节奏
    if let (Some(period), Some(last)) = (self.frame_period, self.last_emit) {
      let elapsed = last.elapsed();
      if elapsed < period {
        thread::sleep(period - elapsed);
      }
    }
    if self.slot.put(SlotItem::Frame(frame)).is_some() {
      debug!("丢弃未被取走的旧帧");
    }
    self.last_emit = Some(Instant::now());
    self.emitted += 1;
  }
}
