// 该文件是 Pindai 项目的一部分。
// tests/common/mod.rs - 集成测试共用工具
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

#![allow(dead_code)]

use std::{
  io::Cursor,
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use axum::{
  Router,
  body::Body,
  http::{Request, header},
};
use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use pindai::{
  model::{DetectItem, DetectResult, Model, ModelError, SharedModel},
  output::{AnnotatedImageOutput, OutputError, Render, SharedRender, draw::Draw},
  server::{AppState, router},
  storage::{ResultStore, StoragePaths},
  task::DetectTask,
  upload::UploadStore,
};

pub const BOUNDARY: &str = "pindai-test-boundary";

/// 返回固定检测结果并统计调用次数
pub struct MockModel {
  items: Vec<DetectItem>,
  fail: bool,
  calls: AtomicUsize,
}

impl MockModel {
  pub fn detecting(items: Vec<DetectItem>) -> Arc<Self> {
    Arc::new(Self {
      items,
      fail: false,
      calls: AtomicUsize::new(0),
    })
  }

  pub fn nothing() -> Arc<Self> {
    Self::detecting(Vec::new())
  }

  pub fn failing() -> Arc<Self> {
    Arc::new(Self {
      items: Vec::new(),
      fail: true,
      calls: AtomicUsize::new(0),
    })
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Model for MockModel {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, _input: &RgbImage) -> Result<DetectResult, ModelError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail {
      return Err(ModelError::Runtime("mock failure".to_string()));
    }
    Ok(DetectResult::new(self.items.clone()))
  }
}

/// 什么都不写的输出，模拟模型没有保存结果图片
pub struct SilentRender;

impl Render<RgbImage, DetectResult> for SilentRender {
  type Error = OutputError;

  fn render_result(&self, _: &RgbImage, _: &DetectResult, _: &Path) -> Result<(), OutputError> {
    Ok(())
  }
}

pub fn bottle() -> DetectItem {
  DetectItem {
    class_id: 39,
    label: "bottle".to_string(),
    score: 0.87,
    bbox: [0.2, 0.1, 0.6, 0.9],
  }
}

pub fn png_bytes() -> Vec<u8> {
  let image = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 128]));
  let mut buf = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
    .expect("encode png");
  buf
}

pub struct TestApp {
  pub root: TempDir,
  pub router: Router,
  pub paths: StoragePaths,
}

impl TestApp {
  pub fn new(model: SharedModel) -> Self {
    let draw = Draw::new().expect("built-in font");
    Self::with_render(model, Arc::new(AnnotatedImageOutput::new(draw)))
  }

  pub fn with_render(model: SharedModel, render: SharedRender) -> Self {
    Self::build(model, render, 16 * 1024 * 1024)
  }

  pub fn with_upload_limit(model: SharedModel, max_upload_bytes: usize) -> Self {
    let draw = Draw::new().expect("built-in font");
    Self::build(model, Arc::new(AnnotatedImageOutput::new(draw)), max_upload_bytes)
  }

  fn build(model: SharedModel, render: SharedRender, max_upload_bytes: usize) -> Self {
    let root = tempfile::tempdir().expect("tempdir");
    let paths = StoragePaths::under(root.path());
    paths.ensure().expect("storage paths");

    let task = DetectTask::new(
      model,
      render,
      UploadStore::new(&paths.uploads),
      ResultStore::new(&paths.results),
    );
    let router = router(AppState::new(task), max_upload_bytes, Duration::from_secs(30));

    Self {
      root,
      router,
      paths,
    }
  }

  pub fn uploaded_files(&self) -> Vec<String> {
    list_names(&self.paths.uploads)
  }

  pub fn batch_dirs(&self) -> Vec<String> {
    list_names(&self.paths.results)
      .into_iter()
      .filter(|name| name.starts_with("temp"))
      .collect()
  }
}

fn list_names(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = std::fs::read_dir(dir)
    .expect("read dir")
    .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}

/// 组装 multipart 请求体，`filename` 为 None 时字段不带文件名
pub fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
  match filename {
    Some(name) => body.extend_from_slice(
      format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n").as_bytes(),
    ),
    None => body.extend_from_slice(
      format!("Content-Disposition: form-data; name=\"{field}\"\r\n").as_bytes(),
    ),
  }
  body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
  body
}

pub fn upload_request(body: Vec<u8>) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri("/")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(body))
    .expect("request")
}

pub fn upload_file(filename: &str, content: &[u8]) -> Request<Body> {
  upload_request(multipart_body("file", Some(filename), content))
}

pub async fn body_text(response: axum::response::Response) -> String {
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .expect("body");
  String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
