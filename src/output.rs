// 该文件是 Pindai 项目的一部分。
// src/output.rs - 输出定义
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

use std::{path::Path, sync::Arc};

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::model::DetectResult;

pub mod draw;

use self::draw::Draw;

/// 标注图片在结果目录中的文件名
pub const ANNOTATED_IMAGE_NAME: &str = "image0.jpg";
/// 检测记录在结果目录中的文件名
pub const DETECTIONS_FILE_NAME: &str = "detections.json";

pub trait Render<Frame, Output>: Send + Sync {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output, dir: &Path) -> Result<(), Self::Error>;
}

pub type SharedRender = Arc<dyn Render<RgbImage, DetectResult, Error = OutputError>>;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("image error: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("failed to serialise detections: {0}")]
  RecordError(#[from] serde_json::Error),
  #[error("invalid font: {0}")]
  Font(String),
}

/// 把标注图片与检测记录写入结果目录
pub struct AnnotatedImageOutput {
  draw: Draw,
}

impl AnnotatedImageOutput {
  pub fn new(draw: Draw) -> Self {
    Self { draw }
  }
}

impl Render<RgbImage, DetectResult> for AnnotatedImageOutput {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &RgbImage,
    result: &DetectResult,
    dir: &Path,
  ) -> Result<(), Self::Error> {
    let mut image = frame.clone();
    self.draw.draw_detections(&mut image, result);

    let image_path = dir.join(ANNOTATED_IMAGE_NAME);
    image.save(&image_path)?;
    debug!("保存标注图像: {}", image_path.display());

    let records = serde_json::to_vec_pretty(&result.records())?;
    std::fs::write(dir.join(DETECTIONS_FILE_NAME), records)?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, DetectionRecord};

  #[test]
  fn writes_annotated_image_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbImage::from_pixel(64, 48, image::Rgb([10, 20, 30]));
    let result = DetectResult::new(vec![DetectItem {
      class_id: 39,
      label: "bottle".to_string(),
      score: 0.87,
      bbox: [0.1, 0.1, 0.5, 0.9],
    }]);

    AnnotatedImageOutput::new(Draw::new().unwrap())
      .render_result(&frame, &result, dir.path())
      .unwrap();

    let saved = image::open(dir.path().join(ANNOTATED_IMAGE_NAME)).unwrap();
    assert_eq!((saved.width(), saved.height()), (64, 48));

    let records: Vec<DetectionRecord> =
      serde_json::from_slice(&std::fs::read(dir.path().join(DETECTIONS_FILE_NAME)).unwrap())
        .unwrap();
    assert_eq!(records, result.records());
  }

  #[test]
  fn missing_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbImage::new(8, 8);
    let err = AnnotatedImageOutput::new(Draw::new().unwrap())
      .render_result(&frame, &DetectResult::default(), &dir.path().join("gone"))
      .unwrap_err();
    assert!(matches!(
      err,
      OutputError::ImageError(_) | OutputError::IoError(_)
    ));
  }
}
