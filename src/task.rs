// 该文件是 Pindai 项目的一部分。
// src/task.rs - 单次上传的检测任务
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

use std::{path::Path, time::Instant};

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageReader, RgbImage};
use tracing::{debug, info};

use crate::{
  error::ProcessError,
  model::{DetectionRecord, SharedModel},
  output::SharedRender,
  storage::{ResultStore, find_result_image},
  upload::{Upload, UploadStore, extension_of},
};

/// 成功处理后返回给页面的数据
#[derive(Debug, Clone)]
pub struct Processed {
  pub image_base64: String,
  pub mime: &'static str,
  pub detections: Vec<DetectionRecord>,
}

/// 结果图片的 MIME 类型，按扩展名判断
pub fn mime_for(path: &Path) -> &'static str {
  match path
    .file_name()
    .and_then(|name| name.to_str())
    .and_then(extension_of)
    .as_deref()
  {
    Some("png") => "image/png",
    _ => "image/jpeg",
  }
}

fn load_frame(path: &Path) -> Result<RgbImage, ProcessError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  Ok(image.to_rgb8())
}

/// 保存上传、推理、渲染并读取结果图片
pub struct DetectTask {
  model: SharedModel,
  render: SharedRender,
  uploads: UploadStore,
  results: ResultStore,
}

impl DetectTask {
  pub fn new(
    model: SharedModel,
    render: SharedRender,
    uploads: UploadStore,
    results: ResultStore,
  ) -> Self {
    Self {
      model,
      render,
      uploads,
      results,
    }
  }

  pub fn uploads(&self) -> &UploadStore {
    &self.uploads
  }

  pub fn results(&self) -> &ResultStore {
    &self.results
  }

  /// 阻塞执行，调用方负责放到阻塞线程池
  pub fn run(&self, upload: &Upload) -> Result<Processed, ProcessError> {
    info!("开始处理上传: {}", upload.filename);
    let started = Instant::now();

    let path = self.uploads.save(upload)?;
    let frame = load_frame(&path)?;
    debug!("输入图像尺寸: {}x{}", frame.width(), frame.height());

    let now = Instant::now();
    let result = self.model.infer(&frame)?;
    info!("推理完成，检测到 {} 个物体，耗时: {:.2?}", result.len(), now.elapsed());

    // 出错返回时批次随 drop 删除
    let batch = self.results.create_batch()?;
    let now = Instant::now();
    self.render.render_result(&frame, &result, batch.path())?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    let image_path = find_result_image(batch.path())?;
    let bytes = std::fs::read(&image_path)?;
    let processed = Processed {
      image_base64: STANDARD.encode(bytes),
      mime: mime_for(&image_path),
      detections: result.records(),
    };

    let committed = self.results.commit(batch);
    info!(
      "处理完成: {}，总耗时: {:.2?}",
      committed.display(),
      started.elapsed()
    );
    Ok(processed)
  }
}
