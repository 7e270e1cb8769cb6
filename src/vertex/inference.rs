// 该文件是 Beifeng （北风） 项目的一部分。
// src/vertex/inference.rs - 推理顶点
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

use std::time::Instant;

use tracing::{debug, info};

use super::{Datum, FRAME_IDX, MapOutput, MapStage, Message, StageError, append_boxes};
use crate::{frame::decode_image, model::Detector};

/// 对缩放后的帧运行检测，把检测框追加到键中
pub struct Inference<D> {
  detector: D,
}

impl<D: Detector> Inference<D> {
  pub fn new(detector: D) -> Self {
    info!("推理顶点初始化");
    Self { detector }
  }
}

impl<D: Detector> MapStage for Inference<D> {
  fn process(&self, datum: &Datum) -> Result<MapOutput, StageError> {
    let mut keys = datum.vertex_keys()?;
    let frame_idx = keys.get_i64(FRAME_IDX)?;
    let frame = decode_image(&datum.value)?;

    let now = Instant::now();
    let result = self.detector.detect(&frame)?;
    info!(
      "frame_index: {}, 推理完成 {} 个检测框, 耗时: {:.2?}",
      frame_idx,
      result.len(),
      now.elapsed()
    );

    if result.is_empty() {
      return Ok(MapOutput::Drop);
    }

    let total = append_boxes(&mut keys, &result)?;
    debug!("frame_index: {}, box_len={}", frame_idx, total);

    Ok(MapOutput::Forward(Message {
      value: datum.value.clone(),
      keys: keys.to_keys(),
    }))
  }
}
