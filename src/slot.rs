// 该文件是 Beifeng （北风） 项目的一部分。
// src/slot.rs - 单槽帧交接缓冲
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

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// 容量为 1 的帧交接槽
///
/// 生产者 `put` 永不阻塞：槽中已有未取走的条目时直接丢弃旧条目，
/// 只保留最新的一个。消费者 `take` 在槽为空时阻塞等待。
/// 结束标记由 `put_last` 放入，排在未取走的条目之后，不会挤掉它。
/// 克隆得到的句柄共享同一个槽。
pub struct FrameSlot<T> {
  inner: Arc<SlotInner<T>>,
}

struct SlotInner<T> {
  state: Mutex<SlotState<T>>,
  ready: Condvar,
}

struct SlotState<T> {
  item: Option<T>,
  last: Option<T>,
}

impl<T> SlotState<T> {
  fn pop(&mut self) -> Option<T> {
    self.item.take().or_else(|| self.last.take())
  }
}

impl<T> Clone for FrameSlot<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T> Default for FrameSlot<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> FrameSlot<T> {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(SlotInner {
        state: Mutex::new(SlotState {
          item: None,
          last: None,
        }),
        ready: Condvar::new(),
      }),
    }
  }

  // 槽内只有两个 Option，持锁线程 panic 后状态仍然完整
  fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
    self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 放入新条目，返回被挤掉的旧条目（如果有）
  pub fn put(&self, item: T) -> Option<T> {
    let evicted = self.lock().item.replace(item);
    self.inner.ready.notify_one();
    evicted
  }

  /// 放入结束标记，槽中现有条目被取走后才会交出
  ///
  /// 重复调用时只保留最后一个标记。
  pub fn put_last(&self, item: T) {
    self.lock().last = Some(item);
    self.inner.ready.notify_one();
  }

  /// 阻塞直到有条目可取
  pub fn take(&self) -> T {
    let mut guard = self.lock();
    loop {
      if let Some(item) = guard.pop() {
        return item;
      }
      guard = self
        .inner
        .ready
        .wait(guard)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }

  /// 最多等待 `timeout`，超时返回 `None`
  pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
    let deadline = Instant::now() + timeout;
    let mut guard = self.lock();
    loop {
      if let Some(item) = guard.pop() {
        return Some(item);
      }
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return None;
      }
      guard = self
        .inner
        .ready
        .wait_timeout(guard, remaining)
        .unwrap_or_else(PoisonError::into_inner)
        .0;
    }
  }

  pub fn is_empty(&self) -> bool {
    let state = self.lock();
    state.item.is_none() && state.last.is_none()
  }
}
