// 该文件是 Pindai 项目的一部分。
// src/model.rs - 模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Pindai Contributors

use std::{path::PathBuf, sync::Arc};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub trait Model: Send + Sync {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 进程内共享的模型句柄，启动时加载一次，之后只读
pub type SharedModel =
  Arc<dyn Model<Input = RgbImage, Output = DetectResult, Error = ModelError>>;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: usize,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// 提取 {name, confidence} 表
  pub fn records(&self) -> Vec<DetectionRecord> {
    self
      .items
      .iter()
      .map(|item| DetectionRecord {
        name: item.label.clone(),
        confidence: item.score,
      })
      .collect()
  }
}

/// 单个检测结果的标签与置信度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub name: String,
  pub confidence: f32,
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("model directory not found at {}", .0.display())]
  SourceNotFound(PathBuf),
  #[error("model weights not found at {}", .0.display())]
  WeightsNotFound(PathBuf),
  #[error("unsupported model source: {0}")]
  SourceError(String),
  #[error("failed to read labels: {0}")]
  Labels(#[from] std::io::Error),
  #[error("failed to load model: {0}")]
  Load(String),
  #[error("runtime error: {0}")]
  Runtime(String),
  #[error("unexpected model output: {0}")]
  UnexpectedOutput(String),
  #[error("model session lock poisoned")]
  Poisoned,
}

pub mod labels;
pub mod letterbox;

#[cfg(feature = "model_yolov5")]
mod yolov5;
#[cfg(feature = "model_yolov5")]
pub use self::yolov5::{Yolov5, Yolov5Builder};

mod decode;
pub use self::decode::{DecodeOptions, decode_predictions, non_max_suppression};
